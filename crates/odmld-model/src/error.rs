use odmld_binding::BindingError;
use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("token budget exceeded: {tokens} tokens requested, {budget} available")]
    TokenBudgetExceeded { tokens: u32, budget: u32 },

    #[error("append is forbidden while a generation is running")]
    GenerationInProgress,

    #[error("model wrapper's task actor has shut down")]
    WrapperStopped,
}

impl From<ModelError> for OdmlError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Binding(b) => b.into(),
            ModelError::TokenBudgetExceeded { .. } => {
                OdmlError::InvalidArgument(e.to_string())
            }
            ModelError::GenerationInProgress => OdmlError::InvalidArgument(e.to_string()),
            ModelError::WrapperStopped => OdmlError::UnknownError(e.to_string()),
        }
    }
}
