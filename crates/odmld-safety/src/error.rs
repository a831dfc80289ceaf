use odmld_binding::BindingError;
use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SafetyError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("unknown feature tag {0}")]
    UnknownFeatureTag(u32),
}

impl From<SafetyError> for OdmlError {
    fn from(e: SafetyError) -> Self {
        match e {
            SafetyError::Binding(b) => b.into(),
            SafetyError::UnknownFeatureTag(_) => OdmlError::InvalidArgument(e.to_string()),
        }
    }
}
