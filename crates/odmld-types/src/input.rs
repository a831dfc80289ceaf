/// The smallest unit of a model input (glossary "Input piece"): a role
/// marker, an end marker, literal text, or a non-text modality buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPiece {
    SystemRole,
    UserRole,
    ModelRole,
    End,
    Text(String),
    Image(Vec<u8>),
    Audio(Vec<u8>),
}

/// An ordered sequence of `InputPiece`s submitted to `Session::append`.
pub type InputBundle = Vec<InputPiece>;

/// A detected-language record optionally attached to `SafetyInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLanguage {
    pub language: String,
    pub confidence: f32,
}

/// Safety classification output attached to a streamed chunk or summary
/// (§4.3): a score vector plus an optional detected-language record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SafetyInfo {
    pub scores: Vec<f32>,
    pub detected_language: Option<DetectedLanguage>,
}
