use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// `model.json`'s `base_model` record: the base this manifest's weights
/// adapt, identified by UUID and the version it must resolve to.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct BaseModelRef {
    pub uuid: Uuid,
    pub version: String,
}

/// A parsed and path-validated `model.json`.
///
/// A manifest is a *base manifest* iff `base_model` is `None`, else an
/// *adaptation manifest* (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelManifest {
    pub name: String,
    pub version: String,
    pub max_tokens: u32,
    pub adaptation_ranks: Vec<u32>,
    pub weight_path: PathBuf,
    pub ts_data_path: Option<PathBuf>,
    pub ts_sp_model_path: Option<PathBuf>,
    pub ts_dimension: Option<u32>,
    pub base_model: Option<BaseModelRef>,
}

impl ModelManifest {
    pub fn is_base(&self) -> bool {
        self.base_model.is_none()
    }
}

fn default_max_tokens() -> u32 {
    1024
}

/// Raw, unvalidated JSON shape. Unknown fields are ignored by `serde`'s
/// default `#[serde(deny_unknown_fields)]`-free behavior.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RawManifest {
    name: String,
    version: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    adaptation_ranks: Vec<u32>,
    weight_path: String,
    #[serde(default)]
    ts_data_path: Option<String>,
    #[serde(default)]
    ts_sp_model_path: Option<String>,
    #[serde(default)]
    ts_dimension: Option<u32>,
    #[serde(default)]
    base_model: Option<BaseModelRef>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ManifestError {
    #[error("malformed manifest JSON: {0}")]
    Malformed(String),
    #[error("manifest path `{0}` escapes the package root")]
    PathEscape(String),
}

/// Join `relative` beneath `root`, rejecting any component that would climb
/// outside of it via `..` (spec.md §9 design note; REDESIGN FLAG: the
/// original source does not enforce this).
fn join_under_root(root: &Path, relative: &str) -> Result<PathBuf, ManifestError> {
    let rel = Path::new(relative);
    if rel
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
        || rel.is_absolute()
    {
        return Err(ManifestError::PathEscape(relative.to_string()));
    }
    Ok(root.join(rel))
}

/// Parse and validate a `model.json` document rooted at `package_root`.
///
/// Strict per spec.md §9: unknown fields are ignored (serde's default
/// behavior), `weight_path` is required, and every path field is rejected if
/// it would escape `package_root` via `..`.
pub fn parse_manifest(json: &[u8], package_root: &Path) -> Result<ModelManifest, ManifestError> {
    let raw: RawManifest =
        serde_json::from_slice(json).map_err(|e| ManifestError::Malformed(e.to_string()))?;

    let weight_path = join_under_root(package_root, &raw.weight_path)?;
    let ts_data_path = raw
        .ts_data_path
        .as_deref()
        .map(|p| join_under_root(package_root, p))
        .transpose()?;
    let ts_sp_model_path = raw
        .ts_sp_model_path
        .as_deref()
        .map(|p| join_under_root(package_root, p))
        .transpose()?;

    Ok(ModelManifest {
        name: raw.name,
        version: raw.version,
        max_tokens: raw.max_tokens,
        adaptation_ranks: raw.adaptation_ranks,
        weight_path,
        ts_data_path,
        ts_sp_model_path,
        ts_dimension: raw.ts_dimension,
        base_model: raw.base_model,
    })
}

/// JSON Schema for `model.json`, useful for installer-side validation tooling.
pub fn manifest_json_schema() -> schemars::Schema {
    schemars::schema_for!(RawManifest)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_base_manifest_with_defaults() {
        let json = br#"{"name":"gecko","version":"1.0","weight_path":"weights.bin"}"#;
        let m = parse_manifest(json, Path::new("/pkg")).unwrap();
        assert_eq!(m.max_tokens, 1024);
        assert!(m.adaptation_ranks.is_empty());
        assert!(m.is_base());
        assert_eq!(m.weight_path, Path::new("/pkg/weights.bin"));
    }

    #[test]
    fn parses_adaptation_manifest() {
        let json = br#"{
            "name":"lora",
            "version":"1.0",
            "weight_path":"adapt.bin",
            "base_model":{"uuid":"00000000-0000-0000-0000-000000000001","version":"1.0.0"}
        }"#;
        let m = parse_manifest(json, Path::new("/pkg")).unwrap();
        assert!(!m.is_base());
        assert_eq!(m.base_model.unwrap().version, "1.0.0");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = br#"{"name":"n","version":"1","weight_path":"w.bin","extra_field":42}"#;
        assert!(parse_manifest(json, Path::new("/pkg")).is_ok());
    }

    #[test]
    fn missing_weight_path_is_an_error() {
        let json = br#"{"name":"n","version":"1"}"#;
        assert!(matches!(
            parse_manifest(json, Path::new("/pkg")),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_path_escape() {
        let json = br#"{"name":"n","version":"1","weight_path":"../../etc/passwd"}"#;
        assert!(matches!(
            parse_manifest(json, Path::new("/pkg")),
            Err(ManifestError::PathEscape(_))
        ));
    }
}
