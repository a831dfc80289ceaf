use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BindingError {
    #[error("shim library is not available")]
    ShimNotReady,

    #[error("entry point `{0}` missing from shim")]
    MissingEntryPoint(String),

    #[error("library reported execution failure: {0}")]
    ExecutionFailed(String),

    #[error("model handle {0:?} is unknown to the library")]
    UnknownModel(crate::handles::ModelHandle),

    #[error("session handle {0:?} is unknown to the library")]
    UnknownSession(crate::handles::SessionHandle),

    #[error("cancelled")]
    Cancelled,
}

impl From<BindingError> for OdmlError {
    fn from(e: BindingError) -> Self {
        match e {
            BindingError::ShimNotReady | BindingError::MissingEntryPoint(_) => {
                OdmlError::LoadLibraryFailed(e.to_string())
            }
            BindingError::Cancelled => OdmlError::Cancelled,
            BindingError::ExecutionFailed(_)
            | BindingError::UnknownModel(_)
            | BindingError::UnknownSession(_) => OdmlError::ModelExecutionFailed(e.to_string()),
        }
    }
}
