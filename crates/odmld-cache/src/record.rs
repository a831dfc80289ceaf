use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EmbeddingRecord {
    pub(crate) values: Embedding,
    pub(crate) updated_time_ms: u64,
}

/// The whole on-disk record set. The encoding is opaque by design (spec
/// only requires the same implementation to read back what it wrote), so
/// this is just the JSON-serializable mirror of the in-memory map.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct EmbeddingRecords {
    pub(crate) records: HashMap<String, EmbeddingRecord>,
}
