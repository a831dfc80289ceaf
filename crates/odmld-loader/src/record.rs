use std::sync::{Arc, Weak};

use odmld_model::ModelWrapper;
use odmld_types::OdmlError;
use tokio::sync::{mpsc, oneshot};

type PendingLoad = oneshot::Sender<Result<Arc<ModelWrapper>, OdmlError>>;

/// One UUID's resolution state (§3 `PlatformModelRecord`). A record with a
/// non-empty `pending_loads` is in flight: at most one installer run exists
/// for it at a time, and later callers during that window are appended, not
/// re-launched.
#[derive(Default)]
pub struct PlatformModelRecord {
    progress: f32,
    model: Weak<ModelWrapper>,
    version: Option<String>,
    pending_loads: Vec<PendingLoad>,
    observers: Vec<mpsc::UnboundedSender<f32>>,
}

impl PlatformModelRecord {
    pub fn is_in_flight(&self) -> bool {
        !self.pending_loads.is_empty()
    }

    /// A weak ref alive under a version match (§3 invariant); stale weak
    /// references are pruned lazily, here, at the point of dereference.
    pub fn resolved(&self, expected_version: Option<&str>) -> Option<Arc<ModelWrapper>> {
        let wrapper = self.model.upgrade()?;
        if let Some(expected) = expected_version {
            if self.version.as_deref() != Some(expected) {
                return None;
            }
        }
        Some(wrapper)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn push_pending(&mut self, tx: PendingLoad) {
        self.pending_loads.push(tx);
    }

    pub fn push_observer(&mut self, tx: mpsc::UnboundedSender<f32>) {
        self.observers.push(tx);
    }

    /// Progress is monotone non-decreasing per record; regressions from the
    /// installer are clamped rather than propagated (§4.5 step 6).
    pub fn update_progress(&mut self, fraction: f32) {
        if fraction > self.progress {
            self.progress = fraction;
        }
        self.observers.retain(|tx| tx.send(self.progress).is_ok());
    }

    pub fn publish(&mut self, wrapper: &Arc<ModelWrapper>, version: String) {
        self.model = Arc::downgrade(wrapper);
        self.version = Some(version);
    }

    /// Drains every queued pending load against one terminal result,
    /// leaving the record ready to be launched again from scratch (§7
    /// propagation policy: a fatal error fails all queued loads and clears
    /// them).
    pub fn drain_pending(&mut self) -> Vec<PendingLoad> {
        std::mem::take(&mut self.pending_loads)
    }
}
