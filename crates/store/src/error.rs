use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state error: {0}")]
    State(#[from] llmgate_state::StateError),

    #[error("corrupt record at {id}: {message}")]
    Corrupt { id: String, message: String },
}

impl From<StoreError> for llmgate_core::GatewayError {
    fn from(err: StoreError) -> Self {
        llmgate_core::GatewayError::State(err.to_string())
    }
}
