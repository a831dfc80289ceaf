use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ShimError {
    #[error("shim installer failed: {0}")]
    InstallFailed(String),

    #[error("failed to load shim library at {path}: {source}")]
    LoadFailed { path: String, source: String },

    #[error("entry point `{0}` not found in shim library")]
    SymbolNotFound(String),
}

impl From<ShimError> for OdmlError {
    fn from(e: ShimError) -> Self {
        OdmlError::LoadLibraryFailed(e.to_string())
    }
}
