use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated OS thread backing one `ModelHandle`'s foreign-library calls
/// (§4.2, §5): the inference library is assumed single-threaded per model,
/// so every op against it is relayed through this one thread, mirroring
/// `slab-core::engine::ggml::llama::worker::InferenceWorkerState` — one
/// worker owns the model/context and drains a command channel.
///
/// Unlike the teacher's worker, whose commands are a fixed enum tied to
/// `llama.cpp`'s specific operations, this worker relays arbitrary boxed
/// closures: the shim's entry points are resolved dynamically by name, so
/// the set of possible calls isn't known at this layer.
pub(crate) struct ModelWorker {
    cmd_tx: std_mpsc::Sender<Job>,
    _thread: JoinHandle<()>,
}

impl ModelWorker {
    pub(crate) fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = std_mpsc::channel::<Job>();
        let thread = std::thread::spawn(move || {
            while let Ok(job) = cmd_rx.recv() {
                job();
            }
        });
        Self {
            cmd_tx,
            _thread: thread,
        }
    }

    /// Runs `job` on this model's worker thread and awaits its result.
    ///
    /// Panics if the worker thread has already exited; that only happens if
    /// a previous job panicked, which this binding never does deliberately.
    pub(crate) async fn post<T, F>(&self, job: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move || {
            let _ = reply_tx.send(job());
        });
        self.cmd_tx
            .send(boxed)
            .expect("model worker thread has exited");
        reply_rx.await.expect("model worker dropped its reply")
    }
}
