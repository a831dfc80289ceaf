use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ShimError;

/// The opaque installer collaborator (§4.1): installs the package containing
/// the shim dynamic library and returns its root directory. Concrete DLC
/// mechanics are out of scope (spec.md §1 Non-goals); this trait is the seam
/// a real installer plugs into.
#[async_trait]
pub trait ShimInstaller: Send + Sync {
    async fn install(&self) -> Result<PathBuf, ShimError>;
}

/// A `ShimInstaller` that always succeeds with a fixed path, for wiring up
/// loaders in tests without a real DLC client.
pub struct FixedPathInstaller {
    pub path: PathBuf,
}

#[async_trait]
impl ShimInstaller for FixedPathInstaller {
    async fn install(&self) -> Result<PathBuf, ShimError> {
        Ok(self.path.clone())
    }
}

/// A `ShimInstaller` that always fails, for exercising the
/// `ensure_ready`-fails-so-the-record-stays-empty path.
pub struct FailingInstaller {
    pub message: String,
}

#[async_trait]
impl ShimInstaller for FailingInstaller {
    async fn install(&self) -> Result<PathBuf, ShimError> {
        Err(ShimError::InstallFailed(self.message.clone()))
    }
}
