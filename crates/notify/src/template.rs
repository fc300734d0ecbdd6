//! A small mustache-like template renderer.
//!
//! Supports `{{var}}`, `{{var|default}}`, list blocks
//! `{{#list}}...{{/list}}` with `{{item}}`/`{{index}}` bound inside, and
//! optional blocks `{{?var}}...{{/var}}` rendered only when `var` is
//! truthy/non-empty. This is deliberately not a general template language —
//! just the subset the four canonical alert templates need.

use std::collections::HashMap;

/// A renderable value bound into a template context.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    List(Vec<HashMap<String, Value>>),
    Bool(bool),
}

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::List(_) => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

pub type Context = HashMap<String, Value>;

/// Render `template` against `ctx`. Unknown variables render as an empty
/// string unless a `|default` fallback is given in the tag.
#[must_use]
pub fn render(template: &str, ctx: &Context) -> String {
    render_inner(template, ctx, None)
}

fn render_inner(template: &str, ctx: &Context, loop_ctx: Option<(&HashMap<String, Value>, usize)>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find("}}") else {
            out.push_str(&rest[start..]);
            break;
        };
        let tag = &rest[start + 2..start + end];
        rest = &rest[start + end + 2..];

        if let Some(list_name) = tag.strip_prefix('#') {
            let (block, after) = find_block(rest, list_name);
            rest = after;
            if let Some(Value::List(items)) = ctx.get(list_name) {
                for (idx, item) in items.iter().enumerate() {
                    let merged = merge(ctx, item);
                    out.push_str(&render_inner(block, &merged, Some((item, idx))));
                }
            }
        } else if let Some(opt_name) = tag.strip_prefix('?') {
            let (block, after) = find_block(rest, opt_name);
            rest = after;
            let truthy = ctx.get(opt_name).is_some_and(Value::is_truthy);
            if truthy {
                out.push_str(&render_inner(block, ctx, loop_ctx));
            }
        } else if tag == "index" {
            if let Some((_, idx)) = loop_ctx {
                out.push_str(&(idx + 1).to_string());
            }
        } else {
            let (name, default) = tag.split_once('|').unwrap_or((tag, ""));
            let name = name.trim();
            let rendered = ctx.get(name).map(Value::as_text).unwrap_or_else(|| default.to_string());
            out.push_str(&rendered);
        }
    }
    out.push_str(rest);
    out
}

fn merge(outer: &Context, item: &HashMap<String, Value>) -> Context {
    let mut merged = outer.clone();
    for (k, v) in item {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Find the `{{/name}}` closing tag matching an opening `{{#name}}` or
/// `{{?name}}`, returning the block body and the remainder of the template
/// after the closing tag. Nesting of the same tag name is not supported,
/// matching the flat block structure the canonical templates use.
fn find_block<'a>(rest: &'a str, name: &str) -> (&'a str, &'a str) {
    let closing = format!("{{{{/{name}}}}}");
    match rest.find(&closing) {
        Some(pos) => (&rest[..pos], &rest[pos + closing.len()..]),
        None => (rest, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_simple_variable() {
        let mut ctx = Context::new();
        ctx.insert("name".to_string(), Value::from("Acme"));
        assert_eq!(render("Hello {{name}}!", &ctx), "Hello Acme!");
    }

    #[test]
    fn missing_variable_uses_default() {
        let ctx = Context::new();
        assert_eq!(render("{{name|Unknown}}", &ctx), "Unknown");
    }

    #[test]
    fn missing_variable_without_default_renders_empty() {
        let ctx = Context::new();
        assert_eq!(render("[{{name}}]", &ctx), "[]");
    }

    #[test]
    fn optional_block_renders_only_when_truthy() {
        let mut ctx = Context::new();
        ctx.insert("note".to_string(), Value::from(""));
        assert_eq!(render("a{{?note}}: {{note}}{{/note}}b", &ctx), "ab");

        ctx.insert("note".to_string(), Value::from("hi"));
        assert_eq!(render("a{{?note}}: {{note}}{{/note}}b", &ctx), "a: hib");
    }

    #[test]
    fn list_block_binds_item_and_index() {
        let mut ctx = Context::new();
        let items = vec!["gpt-4o", "claude-3"]
            .into_iter()
            .map(|name| {
                let mut m = HashMap::new();
                m.insert("item".to_string(), Value::from(name));
                m
            })
            .collect();
        ctx.insert("models".to_string(), Value::List(items));

        let rendered = render("{{#models}}{{index}}. {{item}}\n{{/models}}", &ctx);
        assert_eq!(rendered, "1. gpt-4o\n2. claude-3\n");
    }

    #[test]
    fn empty_list_renders_nothing() {
        let mut ctx = Context::new();
        ctx.insert("models".to_string(), Value::List(vec![]));
        assert_eq!(render("before{{#models}}x{{/models}}after", &ctx), "beforeafter");
    }
}
