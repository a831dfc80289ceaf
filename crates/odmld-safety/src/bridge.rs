use std::collections::HashMap;
use std::sync::Arc;

use odmld_binding::InferenceLibrary;
use odmld_types::{FeatureTag, Uuid};

use crate::error::SafetyError;

/// The two pure bridge operations the loader and session engine expose to
/// clients (§4.6): prompt formatting and safety-score validation, both
/// resolved through the shim rather than computed locally. Thin by design —
/// the shim-not-ready retry rule already lives in the binding layer
/// (`ShimInferenceLibrary::resolve`), so this bridge only adapts call shape.
pub struct SafetyBridge {
    library: Arc<dyn InferenceLibrary>,
}

impl SafetyBridge {
    pub fn new(library: Arc<dyn InferenceLibrary>) -> Self {
        Self { library }
    }

    /// Resolves `uuid`/`feature_tag`/`field_map` into the shim's canned
    /// prompt template. `None` means the feature is unknown or the shim
    /// reports missing keys — both are legitimate non-error outcomes.
    pub async fn format_input(
        &self,
        uuid: Uuid,
        feature_tag: FeatureTag,
        field_map: &HashMap<String, String>,
    ) -> Result<Option<String>, SafetyError> {
        Ok(self.library.format_input(uuid, feature_tag, field_map).await?)
    }

    pub async fn validate_safety_result(
        &self,
        feature_tag: FeatureTag,
        text: &str,
        scores: &[f32],
    ) -> Result<bool, SafetyError> {
        Ok(self
            .library
            .validate_safety_result(feature_tag, text, scores)
            .await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use odmld_binding::FakeInferenceLibrary;

    #[tokio::test]
    async fn format_input_round_trips_through_the_fake_library() {
        let bridge = SafetyBridge::new(Arc::new(FakeInferenceLibrary::new()));
        let mut fields = HashMap::new();
        fields.insert("topic".to_string(), "weather".to_string());
        let formatted = bridge
            .format_input(Uuid::nil(), FeatureTag::Summarizer, &fields)
            .await
            .unwrap();
        assert!(formatted.is_some());
    }

    #[tokio::test]
    async fn validate_safety_result_flags_high_scores() {
        let bridge = SafetyBridge::new(Arc::new(FakeInferenceLibrary::new()));
        let ok = bridge
            .validate_safety_result(FeatureTag::Writer, "hello", &[0.1, 0.2])
            .await
            .unwrap();
        assert!(ok);
        let rejected = bridge
            .validate_safety_result(FeatureTag::Writer, "hello", &[0.95])
            .await
            .unwrap();
        assert!(!rejected);
    }
}
