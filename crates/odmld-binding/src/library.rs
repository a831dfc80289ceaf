use async_trait::async_trait;
use odmld_types::{DetectedLanguage, FeatureTag, Uuid};
use tokio::sync::mpsc;

use crate::error::BindingError;
use crate::handles::{AdaptationId, CancelToken, ModelHandle, SessionHandle};
use crate::params::{BenchmarkSample, CreateModelParams, ExecuteOptions, LibraryStreamEvent};

/// Thin typed façade over the opaque handles exposed by the shim (component
/// B, §4.2). A shim-backed implementation resolves each method through
/// `ShimLoader::lookup`; `FakeInferenceLibrary` backs unit tests without a
/// real `.so`, mirroring `fake_chrome_ml_api.cc` in the original source.
#[async_trait]
pub trait InferenceLibrary: Send + Sync {
    async fn create_model(&self, params: CreateModelParams) -> Result<ModelHandle, BindingError>;

    async fn destroy_model(&self, model: ModelHandle) -> Result<(), BindingError>;

    async fn create_session(
        &self,
        model: ModelHandle,
        adaptation: Option<AdaptationId>,
    ) -> Result<SessionHandle, BindingError>;

    async fn clone_session(&self, session: SessionHandle) -> Result<SessionHandle, BindingError>;

    async fn destroy_session(&self, session: SessionHandle) -> Result<(), BindingError>;

    /// Mints a fresh cancel token. Pure Rust bookkeeping (`Arc<AtomicBool>` +
    /// `Notify`); no FFI round trip is needed the way the original's
    /// create-cancel/destroy-cancel pair requires.
    fn new_cancel_token(&self) -> CancelToken {
        CancelToken::new()
    }

    fn cancel(&self, token: &CancelToken) {
        token.cancel();
    }

    async fn execute(
        &self,
        session: SessionHandle,
        model: ModelHandle,
        options: ExecuteOptions,
        cancel: CancelToken,
    ) -> Result<mpsc::Receiver<LibraryStreamEvent>, BindingError>;

    /// Saves `text` into the session's retained context (§4.3 `append`),
    /// a real call into the library distinct from `size_in_tokens`'s
    /// dry-run count: this one is what `generate` later sees.
    async fn append(&self, session: SessionHandle, text: &str) -> Result<(), BindingError>;

    async fn size_in_tokens(&self, session: SessionHandle, text: &str) -> Result<u32, BindingError>;

    /// Returns the probability of `text`'s first token.
    async fn score(&self, session: SessionHandle, text: &str) -> Result<f32, BindingError>;

    /// Forwards to the library's language detector (§4.4 `detect_language`).
    async fn detect_language(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Option<DetectedLanguage>, BindingError>;

    async fn load_adaptation(
        &self,
        model: ModelHandle,
        weight_path: &std::path::Path,
    ) -> Result<AdaptationId, BindingError>;

    /// Two-pass by construction: implementations must grow their buffer to
    /// the length the library reports and retry once on an
    /// "insufficient storage" signal (§4.2).
    async fn classify_text_safety(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Vec<f32>, BindingError>;

    async fn format_input(
        &self,
        uuid: Uuid,
        feature_tag: FeatureTag,
        field_map: &std::collections::HashMap<String, String>,
    ) -> Result<Option<String>, BindingError>;

    async fn validate_safety_result(
        &self,
        feature_tag: FeatureTag,
        text: &str,
        scores: &[f32],
    ) -> Result<bool, BindingError>;

    /// Runs the tiny library benchmark behind `GetEstimatedPerformanceClass`
    /// (§6, §4.2 supplement).
    async fn benchmark(&self) -> Result<BenchmarkSample, BindingError>;
}
