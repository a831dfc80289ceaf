use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LoaderError;

/// State reported by the downloadable-content collaborator for one package
/// id (§4.5 `get_model_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlcState {
    Present,
    Installing,
    Absent,
    Error,
}

/// Installs a package by id, reporting fractional progress as it goes
/// (§4.5 step 6). The collaborator owns the real DLC mechanism — this trait
/// only names the boundary the platform model loader depends on.
#[async_trait]
pub trait DlcInstaller: Send + Sync {
    async fn install(
        &self,
        package_id: &str,
        progress_tx: mpsc::UnboundedSender<f32>,
    ) -> Result<std::path::PathBuf, LoaderError>;
}

#[async_trait]
pub trait DlcStateQuery: Send + Sync {
    async fn query_state(&self, package_id: &str) -> DlcState;
}

/// Test double that installs instantly from a fixed, already-unpacked root.
pub struct FixedRootInstaller {
    pub root: std::path::PathBuf,
}

#[async_trait]
impl DlcInstaller for FixedRootInstaller {
    async fn install(
        &self,
        _package_id: &str,
        progress_tx: mpsc::UnboundedSender<f32>,
    ) -> Result<std::path::PathBuf, LoaderError> {
        let _ = progress_tx.send(1.0);
        Ok(self.root.clone())
    }
}

#[async_trait]
impl DlcStateQuery for FixedRootInstaller {
    async fn query_state(&self, _package_id: &str) -> DlcState {
        DlcState::Present
    }
}
