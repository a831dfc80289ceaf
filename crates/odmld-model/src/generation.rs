use odmld_types::SafetyInfo;

/// The streamed shape of a `generate` call (§4.3): a sequence of chunks
/// followed by exactly one terminal event — a summary, a cancellation, or a
/// synthesized failure. Closed so a responder's `match` is exhaustive,
/// matching `GGMLLlamaEngineError::StreamChunk`'s role in the teacher.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Chunk {
        text: String,
        safety_info: Option<SafetyInfo>,
    },
    Summary {
        safety_info: Option<SafetyInfo>,
        output_token_count: u32,
    },
    /// Library execution failure (§4.3): empty text, terminal-failure flag.
    /// Cancel is implicitly invoked alongside this event.
    Failed(String),
    /// The generation's `CancelToken` fired, from either party (§4.3).
    Cancelled,
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationEvent::Chunk { .. })
    }
}
