mod error;
mod generation;
mod render;
mod session;
mod wrapper;

pub use error::ModelError;
pub use generation::GenerationEvent;
pub use render::render_input_bundle;
pub use session::{AppendOptions, GenerateOptions, Session};
pub use wrapper::{ModelWrapper, RESERVE_TOKENS};
