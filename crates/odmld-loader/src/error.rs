use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LoaderError {
    #[error("invalid platform model uuid")]
    InvalidUuid,

    #[error("install failed for {package_id}: {message}")]
    InstallFailed { package_id: String, message: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("base model version mismatch: expected {expected}, resolved {resolved}")]
    BaseVersionMismatch { expected: String, resolved: String },

    #[error("cyclic base_model reference detected at {0}")]
    CyclicBaseModel(uuid::Uuid),
}

impl From<LoaderError> for OdmlError {
    fn from(e: LoaderError) -> Self {
        OdmlError::LoadLibraryFailed(e.to_string())
    }
}
