use odmld_types::OdmlError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClusterError {
    #[error("distance matrix is not square: row {row} has {len} entries, expected {expected}")]
    NotSquare {
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("exactly one of n_clusters or threshold must be given")]
    AmbiguousStopCondition,

    #[error("n_clusters {n_clusters} is out of range for {n} points")]
    NClustersOutOfRange { n_clusters: usize, n: usize },

    #[error("threshold {0} is negative")]
    NegativeThreshold(f32),
}

impl From<ClusterError> for OdmlError {
    fn from(e: ClusterError) -> Self {
        OdmlError::InvalidArgument(e.to_string())
    }
}
