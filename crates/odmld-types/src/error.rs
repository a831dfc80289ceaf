use thiserror::Error;

/// The single error surface the daemon presents to its callback-style callers.
///
/// Every crate in the workspace defines its own narrower error enum and
/// implements `From<_> for OdmlError` so a caller only ever has to match on
/// one type regardless of which component failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdmlError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to load library: {0}")]
    LoadLibraryFailed(String),

    #[error("gpu blocked: {0}")]
    GpuBlocked(String),

    #[error("model execution failed: {0}")]
    ModelExecutionFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    UnknownError(String),
}

impl OdmlError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn load_library_failed(msg: impl Into<String>) -> Self {
        Self::LoadLibraryFailed(msg.into())
    }

    /// True for the one error kind that is a terminal state rather than a
    /// failure — callers distinguish it from `UnknownError` and friends.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
