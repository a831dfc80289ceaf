use std::path::PathBuf;

use odmld_types::SafetyInfo;

use crate::handles::AdaptationId;

/// Everything `create-model` (§4.2) needs besides the worker it runs on.
#[derive(Debug, Clone)]
pub struct CreateModelParams {
    pub weight_path: PathBuf,
    pub max_tokens: u32,
    pub adaptation_ranks: Vec<u32>,
    pub safety_triple: Option<SafetyTriple>,
}

/// The optional text-safety model triple carried by a manifest (§3).
#[derive(Debug, Clone)]
pub struct SafetyTriple {
    pub data_path: PathBuf,
    pub sp_model_path: PathBuf,
    pub dimension: u32,
}

/// Options accepted by `execute` (§4.3 `generate`).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub max_output_tokens: u32,
    pub adaptation_id: Option<AdaptationId>,
}

/// What the library streams back from `execute`, before the session engine
/// (component C) reshapes it into `GenerationEvent`s. Named distinctly from
/// the session-level type because the library's own terminal signal
/// (`kUnknownError`) and the session's cancellation path are not the same
/// thing (§4.3 failure semantics).
#[derive(Debug, Clone)]
pub enum LibraryStreamEvent {
    Chunk {
        text: String,
        safety_info: Option<SafetyInfo>,
    },
    Done {
        safety_info: Option<SafetyInfo>,
        output_token_count: u32,
    },
    ExecutionFailed(String),
}

/// Inputs to the performance-class benchmark (§6, §4.2 supplement).
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkSample {
    pub device_heap_bytes: u64,
    pub max_buffer_bytes: u64,
    pub input_tokens_per_sec: f32,
    pub output_tokens_per_sec: f32,
    pub is_integrated_gpu: bool,
}
