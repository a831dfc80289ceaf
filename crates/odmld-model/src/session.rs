use std::sync::{Arc, Weak};

use odmld_binding::{AdaptationId, CancelToken, ExecuteOptions, LibraryStreamEvent, SessionHandle};
use odmld_types::InputBundle;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::ModelError;
use crate::generation::GenerationEvent;
use crate::render::render_input_bundle;
use crate::wrapper::{ModelWrapper, RESERVE_TOKENS};

/// Bounds applied to a single `append` call (§4.3). Both fields are
/// approximated in word units rather than the library's own tokenizer: this
/// crate has no tokenizer of its own, and the fake and shim bindings alike
/// only report a *count*, not offsets into a token stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    pub token_offset: Option<u32>,
    pub max_tokens: Option<u32>,
}

/// Bounds applied to a `generate` call (§4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub max_output_tokens: u32,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Running(CancelToken),
}

/// One token context against a `ModelWrapper` (§3, component C). Holds only
/// a weak reference back to its wrapper: the wrapper does not keep its own
/// strong session registry, so a session outlives its wrapper only long
/// enough to notice the wrapper is gone and fail cleanly (§4.4 disconnect).
pub struct Session {
    wrapper: Weak<ModelWrapper>,
    session_handle: SessionHandle,
    adaptation_id: Option<AdaptationId>,
    max_tokens: u32,
    state: Mutex<SessionState>,
    retained_context: Mutex<Vec<InputBundle>>,
}

impl Session {
    pub(crate) fn new(
        wrapper: Weak<ModelWrapper>,
        session_handle: SessionHandle,
        adaptation_id: Option<AdaptationId>,
    ) -> Arc<Self> {
        let max_tokens = wrapper.upgrade().map(|w| w.max_tokens()).unwrap_or(0);
        Arc::new(Self {
            wrapper,
            session_handle,
            adaptation_id,
            max_tokens,
            state: Mutex::new(SessionState::Idle),
            retained_context: Mutex::new(Vec::new()),
        })
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.session_handle
    }

    pub fn adaptation_id(&self) -> Option<AdaptationId> {
        self.adaptation_id
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn wrapper(&self) -> Result<Arc<ModelWrapper>, ModelError> {
        self.wrapper.upgrade().ok_or(ModelError::WrapperStopped)
    }

    /// Appends an input bundle to this session's context (§4.3 `append`).
    /// Forbidden while a generation is running. Returns the number of tokens
    /// the final (offset- and length-bounded) text actually consumed.
    pub async fn append(
        &self,
        bundle: InputBundle,
        options: AppendOptions,
    ) -> Result<u32, ModelError> {
        if matches!(*self.state.lock().await, SessionState::Running(_)) {
            return Err(ModelError::GenerationInProgress);
        }

        let rendered = render_input_bundle(&bundle);
        let words: Vec<&str> = rendered.split_whitespace().collect();
        let start = options.token_offset.unwrap_or(0) as usize;
        let start = start.min(words.len());
        let end = match options.max_tokens {
            Some(n) => (start + n as usize).min(words.len()),
            None => words.len(),
        };
        let bounded_text = words[start..end].join(" ");

        let wrapper = self.wrapper()?;
        let session_handle = self.session_handle;
        let text_for_count = bounded_text.clone();
        let library = wrapper_library(&wrapper);
        let consumed = wrapper
            .run_task(move || {
                async move { library.size_in_tokens(session_handle, &text_for_count).await }
            })
            .await?;

        let budget = wrapper.max_tokens().saturating_sub(RESERVE_TOKENS);
        if consumed > budget {
            return Err(ModelError::TokenBudgetExceeded {
                tokens: consumed,
                budget,
            });
        }

        let library = wrapper_library(&wrapper);
        wrapper
            .run_task(move || async move { library.append(session_handle, &bounded_text).await })
            .await?;

        self.retained_context.lock().await.push(bundle);
        Ok(consumed)
    }

    /// Starts streaming a generation (§4.3 `generate`). Must be `Idle`.
    /// Returns the `CancelToken` shared with the streamed responder so a
    /// caller can cancel independently of dropping its receiver.
    pub async fn generate(
        self: &Arc<Self>,
        options: GenerateOptions,
        chunk_tx: mpsc::Sender<GenerationEvent>,
    ) -> Result<CancelToken, ModelError> {
        let cancel = CancelToken::new();
        {
            let mut state = self.state.lock().await;
            if matches!(*state, SessionState::Running(_)) {
                return Err(ModelError::GenerationInProgress);
            }
            *state = SessionState::Running(cancel.clone());
        }

        let wrapper = self.wrapper()?;
        let session_handle = self.session_handle;
        let adaptation_id = self.adaptation_id;
        let cancel_for_call = cancel.clone();
        let library = wrapper_library(&wrapper);
        let model_handle = library_model_handle(&wrapper);
        let raw_rx = wrapper
            .run_task(move || {
                async move {
                    library
                        .execute(
                            session_handle,
                            model_handle,
                            ExecuteOptions {
                                max_output_tokens: options.max_output_tokens,
                                adaptation_id,
                            },
                            cancel_for_call,
                        )
                        .await
                }
            })
            .await?;

        let this = Arc::clone(self);
        tokio::spawn(relay(raw_rx, chunk_tx, cancel.clone(), this));
        Ok(cancel)
    }

    /// Cancels an in-flight generation. A no-op, not an error, if idle or if
    /// cancel was already called (`CancelToken::cancel` is itself idempotent).
    pub async fn cancel(&self) {
        if let SessionState::Running(token) = &*self.state.lock().await {
            token.cancel();
        }
    }

    /// Produces an independent session over the same underlying context
    /// (§4.3 `clone`). The clone inherits a copy of the retained-context list
    /// so a library lacking native context sharing can still be emulated by
    /// replaying it.
    pub async fn clone_session(self: &Arc<Self>) -> Result<Arc<Session>, ModelError> {
        let wrapper = self.wrapper()?;
        let session_handle = self.session_handle;
        let library = wrapper_library(&wrapper);
        let new_handle = wrapper
            .run_task(move || async move { library.clone_session(session_handle).await })
            .await?;

        let cloned = Session::new(self.wrapper.clone(), new_handle, self.adaptation_id);
        let context = self.retained_context.lock().await.clone();
        *cloned.retained_context.lock().await = context;
        Ok(cloned)
    }

    pub async fn score(&self, text: String) -> Result<f32, ModelError> {
        let wrapper = self.wrapper()?;
        let session_handle = self.session_handle;
        let library = wrapper_library(&wrapper);
        wrapper
            .run_task(move || async move { library.score(session_handle, &text).await })
            .await
    }

    pub async fn size_in_tokens(&self, text: String) -> Result<u32, ModelError> {
        let wrapper = self.wrapper()?;
        let session_handle = self.session_handle;
        let library = wrapper_library(&wrapper);
        wrapper
            .run_task(move || async move { library.size_in_tokens(session_handle, &text).await })
            .await
    }
}

fn wrapper_library(wrapper: &Arc<ModelWrapper>) -> Arc<dyn odmld_binding::InferenceLibrary> {
    wrapper.library().clone()
}

fn library_model_handle(wrapper: &Arc<ModelWrapper>) -> odmld_binding::ModelHandle {
    wrapper.model_handle()
}

/// Drains the library's raw stream into the responder, reshaping each event
/// into a `GenerationEvent` and resetting the session to `Idle` once the
/// stream ends — whether by natural completion, library failure, or
/// cancellation from either side (§4.3, §8 universal invariant: a responder
/// sees exactly one terminal event, or is observed disconnected, never both).
async fn relay(
    mut raw_rx: mpsc::Receiver<LibraryStreamEvent>,
    chunk_tx: mpsc::Sender<GenerationEvent>,
    cancel: CancelToken,
    session: Arc<Session>,
) {
    loop {
        tokio::select! {
            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    None => break,
                    Some(event) => {
                        let mapped = match event {
                            LibraryStreamEvent::Chunk { text, safety_info } => {
                                GenerationEvent::Chunk { text, safety_info }
                            }
                            LibraryStreamEvent::Done { safety_info, output_token_count } => {
                                GenerationEvent::Summary { safety_info, output_token_count }
                            }
                            LibraryStreamEvent::ExecutionFailed(message) => {
                                cancel.cancel();
                                GenerationEvent::Failed(message)
                            }
                        };
                        let terminal = mapped.is_terminal();
                        if chunk_tx.send(mapped).await.is_err() {
                            cancel.cancel();
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                let _ = chunk_tx.send(GenerationEvent::Cancelled).await;
                break;
            }
        }
    }
    *session.state.lock().await = SessionState::Idle;
}

impl Drop for Session {
    /// Best-effort teardown (§4.4): if the wrapper is already gone there is
    /// nothing left to tell, so a failed upgrade is silently tolerated.
    fn drop(&mut self) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let session_handle = self.session_handle;
        tokio::spawn(async move {
            let library = wrapper.library().clone();
            if let Err(e) = library.destroy_session(session_handle).await {
                warn!("destroy-session failed during session teardown: {e}");
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use odmld_binding::{CreateModelParams, FakeInferenceLibrary};
    use odmld_types::InputPiece;

    async fn make_wrapper() -> Arc<ModelWrapper> {
        let library = Arc::new(FakeInferenceLibrary::new());
        let handle = library
            .create_model(CreateModelParams {
                weight_path: "weights.bin".into(),
                max_tokens: 1024,
                adaptation_ranks: vec![],
                safety_triple: None,
            })
            .await
            .unwrap();
        ModelWrapper::new(handle, 1024, library)
    }

    #[tokio::test]
    async fn append_then_generate_streams_a_summary() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        session
            .append(
                vec![InputPiece::UserRole, InputPiece::Text("hi".into())],
                AppendOptions::default(),
            )
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        session
            .generate(GenerateOptions { max_output_tokens: 8 }, tx)
            .await
            .unwrap();

        let mut saw_summary = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, GenerationEvent::Summary { .. }) {
                saw_summary = true;
            }
        }
        assert!(saw_summary);
    }

    #[tokio::test]
    async fn append_is_forbidden_while_running() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        session
            .generate(GenerateOptions { max_output_tokens: 8 }, tx)
            .await
            .unwrap();

        let err = session
            .append(vec![InputPiece::Text("late".into())], AppendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::GenerationInProgress));
    }

    #[tokio::test]
    async fn dropping_the_responder_cancels_the_token() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        let (tx, rx) = mpsc::channel(1);
        let token = session
            .generate(GenerateOptions { max_output_tokens: 8 }, tx)
            .await
            .unwrap();
        drop(rx);
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_no_op() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        session.cancel().await;
    }

    #[tokio::test]
    async fn clone_inherits_retained_context() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        session
            .append(vec![InputPiece::Text("remembered".into())], AppendOptions::default())
            .await
            .unwrap();
        let cloned = session.clone_session().await.unwrap();
        assert_eq!(cloned.retained_context.lock().await.len(), 1);
        assert_ne!(cloned.session_handle(), session.session_handle());
    }

    #[tokio::test]
    async fn append_rejects_when_over_budget() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        let huge = vec![InputPiece::Text("word ".repeat(2000))];
        let err = session.append(huge, AppendOptions::default()).await.unwrap_err();
        assert!(matches!(err, ModelError::TokenBudgetExceeded { .. }));
    }
}
