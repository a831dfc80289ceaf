use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write the embedding cache file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize the embedding cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<CacheError> for OdmlError {
    fn from(e: CacheError) -> Self {
        OdmlError::UnknownError(e.to_string())
    }
}
