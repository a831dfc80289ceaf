use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Opaque inference-library handle for a loaded base model (§3). Exclusively
/// owned by exactly one `ModelWrapper`; never shared across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u64);

/// Integer scoped to a `ModelHandle`, issued by the library for each
/// LoRA-style adaptation layer loaded against a base (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdaptationId(pub u32);

/// Opaque library handle representing a token context (§3). Exclusively
/// owned by one `Session`; supports clone producing an independent handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Mints process-unique handle values for the fake and shim-backed bindings
/// alike, mirroring the monotonic `SessionId`/`seq_id` counters the teacher's
/// worker keeps per engine instance.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Reference-counted, thread-safe, idempotent cancellation handle (§3).
/// Shared by a `Session` and the outstanding streaming responder it feeds;
/// either party may trigger cancellation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Idempotent: the second and later calls are no-ops (§3, scenario 3).
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Raw pointer to the underlying flag, valid for as long as a clone of
    /// this token is kept alive. Used to hand the shim a pollable cancel
    /// flag without a round trip through Rust's async machinery.
    pub(crate) fn raw_flag_ptr(&self) -> *const AtomicBool {
        &self.inner.cancelled as *const AtomicBool
    }

    /// Resolves once `cancel()` has been called; resolves immediately if it
    /// already has been.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
