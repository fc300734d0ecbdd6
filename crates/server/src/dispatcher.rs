//! Default [`ProviderDispatcher`] implementation.
//!
//! The vendor HTTP bodies themselves are out of scope here (only the
//! minimum needed for token accounting matters), so this stub echoes the
//! last user message back as the completion content and estimates token
//! counts from character length, the same stand-in role
//! [`llmgate_health::NoopProbe`] plays for liveness checks.

use async_trait::async_trait;
use llmgate_core::usage::estimate_tokens;
use llmgate_core::{CredentialId, GatewayError, Provider};
use llmgate_gateway::{CompletionRequest, ProviderCompletion, ProviderDispatcher};

pub struct StubDispatcher;

#[async_trait]
impl ProviderDispatcher for StubDispatcher {
    async fn complete(
        &self,
        provider: &Provider,
        _credential_id: &CredentialId,
        request: &CompletionRequest,
    ) -> Result<ProviderCompletion, GatewayError> {
        let last_user_message = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .or_else(|| request.messages.last());

        let content = match last_user_message {
            Some(message) => format!("[{}] {}", provider.id, message.content),
            None => format!("[{}] (empty request)", provider.id),
        };

        let input_tokens = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content, 4))
            .sum();
        let output_tokens = estimate_tokens(&content, 4);

        Ok(ProviderCompletion {
            content,
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
        })
    }
}
