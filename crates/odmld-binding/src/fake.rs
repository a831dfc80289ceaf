use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use odmld_types::{DetectedLanguage, FeatureTag, Uuid};
use tokio::sync::{mpsc, Mutex};

use crate::error::BindingError;
use crate::handles::{AdaptationId, CancelToken, HandleAllocator, ModelHandle, SessionHandle};
use crate::library::InferenceLibrary;
use crate::params::{
    BenchmarkSample, CreateModelParams, ExecuteOptions, LibraryStreamEvent,
};

struct FakeModel {
    params: CreateModelParams,
    next_adaptation: u32,
}

struct FakeSession {
    model: ModelHandle,
    context: Vec<String>,
}

/// In-memory stand-in for the shim-backed library, grounded on
/// `odml/on_device_model/fake/fake_chrome_ml_api.cc`: deterministic,
/// allocation-only behavior good enough to drive the session engine and
/// platform loader's own tests without a real `.so`.
pub struct FakeInferenceLibrary {
    models: Mutex<HashMap<ModelHandle, FakeModel>>,
    sessions: Mutex<HashMap<SessionHandle, FakeSession>>,
    handles: HandleAllocator,
    /// Text that triggers a synthesized library failure on `execute`,
    /// exercising the `kUnknownError` failure path (§4.3).
    pub fail_execute_on_text: Option<String>,
}

impl FakeInferenceLibrary {
    pub fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            handles: HandleAllocator::default(),
            fail_execute_on_text: None,
        }
    }

    pub fn with_failing_text(mut self, text: impl Into<String>) -> Self {
        self.fail_execute_on_text = Some(text.into());
        self
    }
}

impl Default for FakeInferenceLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceLibrary for FakeInferenceLibrary {
    async fn create_model(&self, params: CreateModelParams) -> Result<ModelHandle, BindingError> {
        let handle = ModelHandle(self.handles.next());
        self.models.lock().await.insert(
            handle,
            FakeModel {
                params,
                next_adaptation: 0,
            },
        );
        Ok(handle)
    }

    async fn destroy_model(&self, model: ModelHandle) -> Result<(), BindingError> {
        self.models
            .lock()
            .await
            .remove(&model)
            .ok_or(BindingError::UnknownModel(model))?;
        Ok(())
    }

    async fn create_session(
        &self,
        model: ModelHandle,
        _adaptation: Option<AdaptationId>,
    ) -> Result<SessionHandle, BindingError> {
        if !self.models.lock().await.contains_key(&model) {
            return Err(BindingError::UnknownModel(model));
        }
        let handle = SessionHandle(self.handles.next());
        self.sessions.lock().await.insert(
            handle,
            FakeSession {
                model,
                context: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn clone_session(&self, session: SessionHandle) -> Result<SessionHandle, BindingError> {
        let mut sessions = self.sessions.lock().await;
        let source = sessions
            .get(&session)
            .ok_or(BindingError::UnknownSession(session))?;
        let clone = FakeSession {
            model: source.model,
            context: source.context.clone(),
        };
        let handle = SessionHandle(self.handles.next());
        sessions.insert(handle, clone);
        Ok(handle)
    }

    async fn destroy_session(&self, session: SessionHandle) -> Result<(), BindingError> {
        self.sessions
            .lock()
            .await
            .remove(&session)
            .ok_or(BindingError::UnknownSession(session))?;
        Ok(())
    }

    async fn execute(
        &self,
        session: SessionHandle,
        _model: ModelHandle,
        options: ExecuteOptions,
        cancel: CancelToken,
    ) -> Result<mpsc::Receiver<LibraryStreamEvent>, BindingError> {
        let text = {
            let sessions = self.sessions.lock().await;
            let s = sessions
                .get(&session)
                .ok_or(BindingError::UnknownSession(session))?;
            s.context.join(" ")
        };

        let (tx, rx) = mpsc::channel(8);
        let fail = self
            .fail_execute_on_text
            .as_ref()
            .map(|needle| text.contains(needle.as_str()))
            .unwrap_or(false);
        let max_tokens = options.max_output_tokens.max(1);
        let words: Vec<String> = if text.is_empty() {
            vec!["fake".into(), "response".into(), "tokens".into()]
        } else {
            text.split_whitespace().map(str::to_string).collect()
        };

        tokio::spawn(async move {
            if fail {
                let _ = tx.send(LibraryStreamEvent::ExecutionFailed("fake failure".into())).await;
                return;
            }
            let mut produced = 0u32;
            for word in words {
                if cancel.is_cancelled() || produced >= max_tokens {
                    break;
                }
                if tx
                    .send(LibraryStreamEvent::Chunk {
                        text: word,
                        safety_info: None,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                produced += 1;
            }
            if !cancel.is_cancelled() {
                let _ = tx
                    .send(LibraryStreamEvent::Done {
                        safety_info: None,
                        output_token_count: produced,
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn append(&self, session: SessionHandle, text: &str) -> Result<(), BindingError> {
        let mut sessions = self.sessions.lock().await;
        let s = sessions
            .get_mut(&session)
            .ok_or(BindingError::UnknownSession(session))?;
        s.context.push(text.to_string());
        Ok(())
    }

    async fn size_in_tokens(&self, session: SessionHandle, text: &str) -> Result<u32, BindingError> {
        if !self.sessions.lock().await.contains_key(&session) {
            return Err(BindingError::UnknownSession(session));
        }
        Ok(text.split_whitespace().count() as u32)
    }

    async fn score(&self, session: SessionHandle, text: &str) -> Result<f32, BindingError> {
        if !self.sessions.lock().await.contains_key(&session) {
            return Err(BindingError::UnknownSession(session));
        }
        Ok(if text.is_empty() { 0.0 } else { 0.5 })
    }

    async fn detect_language(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Option<DetectedLanguage>, BindingError> {
        if !self.models.lock().await.contains_key(&model) {
            return Err(BindingError::UnknownModel(model));
        }
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(DetectedLanguage {
            language: "en".to_string(),
            confidence: 0.9,
        }))
    }

    async fn load_adaptation(
        &self,
        model: ModelHandle,
        _weight_path: &std::path::Path,
    ) -> Result<AdaptationId, BindingError> {
        let mut models = self.models.lock().await;
        let m = models.get_mut(&model).ok_or(BindingError::UnknownModel(model))?;
        let id = AdaptationId(m.next_adaptation);
        m.next_adaptation += 1;
        Ok(id)
    }

    async fn classify_text_safety(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Vec<f32>, BindingError> {
        if !self.models.lock().await.contains_key(&model) {
            return Err(BindingError::UnknownModel(model));
        }
        Ok(vec![if text.is_empty() { 0.0 } else { 0.1 }; 4])
    }

    async fn format_input(
        &self,
        _uuid: Uuid,
        feature_tag: FeatureTag,
        field_map: &HashMap<String, String>,
    ) -> Result<Option<String>, BindingError> {
        if matches!(feature_tag, FeatureTag::Other(_)) {
            return Ok(None);
        }
        let mut fields: Vec<_> = field_map.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        let body = fields
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        Ok(Some(body))
    }

    async fn validate_safety_result(
        &self,
        _feature_tag: FeatureTag,
        _text: &str,
        scores: &[f32],
    ) -> Result<bool, BindingError> {
        Ok(scores.iter().all(|s| *s < 0.9))
    }

    async fn benchmark(&self) -> Result<BenchmarkSample, BindingError> {
        Ok(BenchmarkSample {
            device_heap_bytes: 8 * 1024 * 1024 * 1024,
            max_buffer_bytes: 512 * 1024 * 1024,
            input_tokens_per_sec: 200.0,
            output_tokens_per_sec: 20.0,
            is_integrated_gpu: false,
        })
    }
}

pub type SharedFakeInferenceLibrary = Arc<FakeInferenceLibrary>;
