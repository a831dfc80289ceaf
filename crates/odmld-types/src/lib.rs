//! Shared types, manifest parsing, and the unified error surface for `odmld`.

mod error;
mod feature;
mod input;
mod manifest;
mod state;

pub use error::OdmlError;
pub use feature::FeatureTag;
pub use input::{DetectedLanguage, InputBundle, InputPiece, SafetyInfo};
pub use manifest::{manifest_json_schema, parse_manifest, BaseModelRef, ManifestError, ModelManifest};
pub use state::{LoadModelResult, ModelState, PerformanceClass};

pub use uuid::Uuid;
