use std::future::Future;

use odmld_types::OdmlError;

use crate::loader::ShimLoader;

/// Centralizes the shim-not-ready retry rule (§4.1, §9 design notes): if the
/// shim isn't loaded, `ensure_ready` is awaited once; on success `op` is
/// re-dispatched, on failure the call resolves to `LoadLibraryFailed`
/// without ever invoking `op`.
pub async fn with_shim_ready<T, F, Fut>(loader: &ShimLoader, op: F) -> Result<T, OdmlError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, OdmlError>>,
{
    if !loader.is_ready().await && !loader.ensure_ready().await {
        return Err(OdmlError::LoadLibraryFailed(
            "shim library is not available".to_string(),
        ));
    }
    op().await
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::installer::FailingInstaller;

    #[tokio::test]
    async fn surfaces_load_library_failed_when_installer_fails() {
        let loader = ShimLoader::new(Arc::new(FailingInstaller {
            message: "offline".into(),
        }));
        let result: Result<u32, OdmlError> =
            with_shim_ready(&loader, || async { Ok(42) }).await;
        assert!(matches!(result, Err(OdmlError::LoadLibraryFailed(_))));
    }
}
