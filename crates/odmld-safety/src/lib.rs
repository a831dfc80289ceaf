mod bridge;
mod error;

pub use bridge::SafetyBridge;
pub use error::SafetyError;
