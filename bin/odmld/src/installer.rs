use std::path::PathBuf;

use async_trait::async_trait;
use odmld_loader::{DlcInstaller, DlcState, DlcStateQuery, LoaderError};
use tokio::sync::mpsc;

/// Stand-in for the real downloadable-content client (out of scope, §1
/// Non-goals): treats `<root>/<package_id>` as an already-unpacked package.
/// Useful for local development and for pointing the daemon at
/// side-loaded models.
pub struct LocalDirInstaller {
    pub root: PathBuf,
}

#[async_trait]
impl DlcInstaller for LocalDirInstaller {
    async fn install(
        &self,
        package_id: &str,
        progress_tx: mpsc::UnboundedSender<f32>,
    ) -> Result<PathBuf, LoaderError> {
        let package_root = self.root.join(package_id);
        if !package_root.is_dir() {
            return Err(LoaderError::InstallFailed {
                package_id: package_id.to_string(),
                message: format!("no package directory at {}", package_root.display()),
            });
        }
        let _ = progress_tx.send(1.0);
        Ok(package_root)
    }
}

#[async_trait]
impl DlcStateQuery for LocalDirInstaller {
    async fn query_state(&self, package_id: &str) -> DlcState {
        if self.root.join(package_id).is_dir() {
            DlcState::Present
        } else {
            DlcState::Absent
        }
    }
}
