use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use crate::error::ShimError;
use crate::installer::ShimInstaller;

const SHIM_LIBRARY_NAME: &str = "odml_shim";

enum ShimState {
    Unloaded,
    Loading(Vec<oneshot::Sender<bool>>),
    Ready(Arc<Library>),
}

/// Owns the process-global handle to the dynamic library containing the
/// inference, tokenizer, translator, safety and formatting entry points
/// (§4.1). Concurrent `ensure_ready` callers share one installation and are
/// resolved in FIFO order once it completes.
pub struct ShimLoader {
    state: Mutex<ShimState>,
    installer: Arc<dyn ShimInstaller>,
}

// SAFETY: `Library` is never mutated after being stored; all access is
// through the immutable `libloading::Library::get` API, guarded by the
// loader's own `Mutex` during the transition into `Ready`.
unsafe impl Send for ShimLoader {}
unsafe impl Sync for ShimLoader {}

impl ShimLoader {
    pub fn new(installer: Arc<dyn ShimInstaller>) -> Self {
        Self {
            state: Mutex::new(ShimState::Unloaded),
            installer,
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, ShimState::Ready(_))
    }

    /// Ensure the shim is loaded, launching (or joining) an installation if
    /// necessary. Resolves to `true` once the library is ready, `false` if
    /// the installer or the load itself failed — the record is left empty so
    /// a later call can retry.
    pub async fn ensure_ready(&self) -> bool {
        let waiter_rx = {
            let mut state = self.state.lock().await;
            match &mut *state {
                ShimState::Ready(_) => return true,
                ShimState::Loading(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                ShimState::Unloaded => {
                    *state = ShimState::Loading(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter_rx {
            return rx.await.unwrap_or(false);
        }

        let success = self.run_install().await;
        success
    }

    async fn run_install(&self) -> bool {
        match self.installer.install().await {
            Ok(package_root) => match self.load_library(&package_root) {
                Ok(lib) => {
                    info!(path = %package_root.display(), "shim library loaded");
                    self.finish(true, ShimState::Ready(Arc::new(lib))).await;
                    true
                }
                Err(e) => {
                    warn!("failed to load shim library: {e}");
                    self.finish(false, ShimState::Unloaded).await;
                    false
                }
            },
            Err(e) => {
                warn!("shim installer failed: {e}");
                self.finish(false, ShimState::Unloaded).await;
                false
            }
        }
    }

    async fn finish(&self, success: bool, new_state: ShimState) {
        let waiters = {
            let mut state = self.state.lock().await;
            let waiters = match &mut *state {
                ShimState::Loading(w) => std::mem::take(w),
                _ => Vec::new(),
            };
            *state = new_state;
            waiters
        };
        for tx in waiters {
            let _ = tx.send(success);
        }
    }

    fn load_library(&self, package_root: &Path) -> Result<Library, ShimError> {
        let lib_name = format!("{DLL_PREFIX}{SHIM_LIBRARY_NAME}{DLL_SUFFIX}");
        let path = package_root.join(lib_name);
        unsafe { Library::new(&path) }.map_err(|e| ShimError::LoadFailed {
            path: path.display().to_string(),
            source: e.to_string(),
        })
    }

    /// Typed lookup of an entry point. Returns `None` if the shim isn't
    /// loaded or the symbol is absent. `F` is copied out of the `Symbol`
    /// rather than borrowed from it: safe because the backing `Library` is
    /// kept alive for the process's lifetime once `Ready`.
    pub async fn lookup<F: Copy>(&self, name: &str) -> Option<F> {
        let state = self.state.lock().await;
        match &*state {
            ShimState::Ready(lib) => {
                let sym: Symbol<F> = unsafe { lib.get(name.as_bytes()).ok()? };
                Some(*sym)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::installer::{FailingInstaller, FixedPathInstaller};

    #[tokio::test]
    async fn ensure_ready_fails_cleanly_when_installer_fails() {
        let loader = ShimLoader::new(Arc::new(FailingInstaller {
            message: "no network".into(),
        }));
        assert!(!loader.ensure_ready().await);
        assert!(!loader.is_ready().await);
        // A subsequent call retries rather than remembering the failure.
        assert!(!loader.ensure_ready().await);
    }

    #[tokio::test]
    async fn ensure_ready_fails_when_library_is_missing_on_disk() {
        let loader = ShimLoader::new(Arc::new(FixedPathInstaller {
            path: "/nonexistent/package/root".into(),
        }));
        assert!(!loader.ensure_ready().await);
        assert!(!loader.is_ready().await);
    }

    #[tokio::test]
    async fn concurrent_ensure_ready_calls_share_one_installation() {
        let loader = Arc::new(ShimLoader::new(Arc::new(FailingInstaller {
            message: "down".into(),
        })));
        let a = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.ensure_ready().await })
        };
        let b = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.ensure_ready().await })
        };
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap(), false);
        assert_eq!(rb.unwrap(), false);
    }
}
