use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use odmld_binding::{AdaptationId, BindingError, InferenceLibrary, ModelHandle};
use odmld_types::DetectedLanguage;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use crate::error::ModelError;
use crate::session::Session;

/// Token reserve held back from a wrapper's `max_tokens` budget for
/// safety-classifier framing (§4.3). Kept hard-coded per spec.md §9: no
/// caller in this core's scope needs it configurable.
pub const RESERVE_TOKENS: u32 = 2;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

const JOB_QUEUE_CAPACITY: usize = 64;

/// Owns one `ModelHandle` and the single-threaded library behind it (§4.4).
///
/// The wrapper's FIFO scheduler is its bounded `mpsc` job channel: a
/// background actor task drains it one job at a time, awaiting each to
/// completion before taking the next. That loop *is* `run_if_possible`'s
/// pop-and-run-then-re-enter discipline — a hand-rolled `PendingTask` queue
/// plus a running-slot field would just duplicate what the channel and the
/// `await` already guarantee.
pub struct ModelWrapper {
    model_handle: ModelHandle,
    max_tokens: u32,
    library: Arc<dyn InferenceLibrary>,
    job_tx: mpsc::Sender<Job>,
    default_adaptation: Option<AdaptationId>,
    owns_handle: bool,
    /// Keeps a base model's wrapper alive for as long as an adaptation
    /// wrapper built on top of it exists (§4.5 scenario 1: two client
    /// handles to the base plus one adapted child share one `ModelHandle`;
    /// the base only drops once the child has too).
    _base: Option<Arc<ModelWrapper>>,
}

async fn run_actor(mut job_rx: mpsc::Receiver<Job>) {
    while let Some(job) = job_rx.recv().await {
        job().await;
    }
}

impl ModelWrapper {
    /// `max_tokens` is the manifest's declared budget (§3); `library` is
    /// already holding `model_handle` open (§4.5 step 9 publishes the
    /// wrapper only after `create_model` succeeds).
    pub fn new(model_handle: ModelHandle, max_tokens: u32, library: Arc<dyn InferenceLibrary>) -> Arc<Self> {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        tokio::spawn(run_actor(job_rx));
        Arc::new(Self {
            model_handle,
            max_tokens,
            library,
            job_tx,
            default_adaptation: None,
            owns_handle: true,
            _base: None,
        })
    }

    /// Builds a wrapper over an existing base's `ModelHandle`, pinned to a
    /// loaded LoRA adaptation (§4.5 step 8d). Shares the base's job queue
    /// rather than spawning its own: both wrappers address the same
    /// single-threaded library handle, so their calls must interleave on
    /// the same FIFO, not race across two.
    pub fn new_adapted(base: Arc<ModelWrapper>, adaptation_id: AdaptationId) -> Arc<Self> {
        Arc::new(Self {
            model_handle: base.model_handle,
            max_tokens: base.max_tokens,
            library: base.library.clone(),
            job_tx: base.job_tx.clone(),
            default_adaptation: Some(adaptation_id),
            owns_handle: false,
            _base: Some(base),
        })
    }

    pub fn model_handle(&self) -> ModelHandle {
        self.model_handle
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn default_adaptation(&self) -> Option<AdaptationId> {
        self.default_adaptation
    }

    pub(crate) fn library(&self) -> &Arc<dyn InferenceLibrary> {
        &self.library
    }

    /// Posts a library call to the wrapper's single worker slot and awaits
    /// its result. Used by both wrapper-level ops (`load_adaptation`,
    /// `classify_text_safety`) and by `Session`'s own ops, so a session's
    /// append/generate/score/clone share the same FIFO as its siblings
    /// (§5 ordering guarantees).
    pub(crate) async fn run_task<T, F, Fut>(&self, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BindingError>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = f().await;
                let _ = reply_tx.send(result);
            })
        });
        self.job_tx
            .send(job)
            .await
            .map_err(|_| ModelError::WrapperStopped)?;
        let result = reply_rx.await.map_err(|_| ModelError::WrapperStopped)?;
        result.map_err(ModelError::from)
    }

    /// Creates a `Session` against either the base handle or an adapted
    /// variant (§4.4 `start_session`).
    pub async fn start_session(
        self: &Arc<Self>,
        adaptation_id: Option<AdaptationId>,
    ) -> Result<Arc<Session>, ModelError> {
        let adaptation_id = adaptation_id.or(self.default_adaptation);
        let model_handle = self.model_handle;
        let library = self.library.clone();
        let session_handle = self
            .run_task(move || async move { library.create_session(model_handle, adaptation_id).await })
            .await?;
        Ok(Session::new(Arc::downgrade(self), session_handle, adaptation_id))
    }

    /// Loads a LoRA adaptation against this base model (§4.4
    /// `load_adaptation`). Pending sessions are not pre-cleared here: this
    /// core only enforces "single-session-at-a-time" mode where a caller
    /// opts in, which the Non-goals leave as a concern of the feature
    /// consoles above this crate.
    pub async fn load_adaptation(&self, weight_path: PathBuf) -> Result<AdaptationId, ModelError> {
        let model_handle = self.model_handle;
        let library = self.library.clone();
        self.run_task(move || async move { library.load_adaptation(model_handle, &weight_path).await })
            .await
    }

    pub async fn classify_text_safety(&self, text: String) -> Result<Vec<f32>, ModelError> {
        let model_handle = self.model_handle;
        let library = self.library.clone();
        self.run_task(move || async move { library.classify_text_safety(model_handle, &text).await })
            .await
    }

    pub async fn detect_language(&self, text: String) -> Result<Option<DetectedLanguage>, ModelError> {
        let model_handle = self.model_handle;
        let library = self.library.clone();
        self.run_task(move || async move { library.detect_language(model_handle, &text).await })
            .await
    }
}

impl Drop for ModelWrapper {
    /// Wrapper disconnect (§4.4): the last external receiver dropping
    /// triggers `destroy-model`. By this point every `Session` holding only
    /// a weak reference back to this wrapper has already lost the ability
    /// to post new work; this only needs to close the model handle itself.
    /// An adapted wrapper (`owns_handle == false`) doesn't own the handle —
    /// its `_base` field's own drop closes it once the base's last strong
    /// reference is gone.
    fn drop(&mut self) {
        if !self.owns_handle {
            return;
        }
        let library = self.library.clone();
        let model_handle = self.model_handle;
        tokio::spawn(async move {
            if let Err(e) = library.destroy_model(model_handle).await {
                warn!("destroy-model failed during wrapper teardown: {e}");
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use odmld_binding::{CreateModelParams, FakeInferenceLibrary};

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
    async fn start_session_then_classify_text_safety() {
        let wrapper = make_wrapper().await;
        let session = wrapper.start_session(None).await.unwrap();
        assert_eq!(session.max_tokens(), 1024);
        let scores = wrapper.classify_text_safety("hello".into()).await.unwrap();
        assert!(!scores.is_empty());
    }

    #[tokio::test]
    async fn load_adaptation_returns_an_id() {
        let wrapper = make_wrapper().await;
        let id = wrapper.load_adaptation("adapt.bin".into()).await.unwrap();
        assert_eq!(id.0, 0);
        let id2 = wrapper.load_adaptation("adapt2.bin".into()).await.unwrap();
        assert_eq!(id2.0, 1);
    }

    #[tokio::test]
    async fn adapted_wrapper_shares_the_base_handle_and_defaults_its_adaptation() {
        let base = make_wrapper().await;
        let id = base.load_adaptation("adapt.bin".into()).await.unwrap();
        let adapted = ModelWrapper::new_adapted(base.clone(), id);
        assert_eq!(adapted.model_handle(), base.model_handle());
        assert_eq!(adapted.default_adaptation(), Some(id));

        let session = adapted.start_session(None).await.unwrap();
        assert_eq!(session.adaptation_id(), Some(id));
    }

    #[tokio::test]
    async fn dropping_an_adapted_wrapper_does_not_destroy_the_shared_base_handle() {
        let base = make_wrapper().await;
        let id = base.load_adaptation("adapt.bin".into()).await.unwrap();
        let adapted = ModelWrapper::new_adapted(base.clone(), id);
        drop(adapted);
        // base is still alive: a fresh session against it still works.
        tokio::task::yield_now().await;
        base.start_session(None).await.unwrap();
    }
}
