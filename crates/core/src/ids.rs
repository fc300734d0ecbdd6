//! Typed identifiers used throughout the gateway.
//!
//! Each id is a thin wrapper over a `String` so it serializes transparently
//! and can be used as a map key, while keeping tenant/provider/agent ids from
//! being accidentally swapped at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(TenantId, "Identifier of a tenant.");
string_id!(ProviderId, "Identifier of an LLM provider configuration.");
string_id!(AgentId, "Identifier of an admin agent / calling application.");
string_id!(CredentialId, "Identifier of a single credential within a provider's pool.");
string_id!(BotId, "Identifier of a bot whose liveness the health checker tracks.");
string_id!(AdminAgentId, "Identifier of an admin agent managed by the supervisor loop.");
string_id!(ModelId, "Identifier of a model exposed by a provider, e.g. \"gpt-4o\".");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let id = TenantId::from("tenant-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tenant-1\"");
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn displays_as_inner_string() {
        let id = ProviderId::from("openai-primary");
        assert_eq!(id.to_string(), "openai-primary");
        assert_eq!(id.as_str(), "openai-primary");
    }
}
