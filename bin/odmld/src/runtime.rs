use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use odmld_binding::{performance, InferenceLibrary, ShimInferenceLibrary};
use odmld_cache::EmbeddingCache;
use odmld_loader::{load_model_result_of, PlatformModelLoader};
use odmld_safety::SafetyBridge;
use odmld_shim::ShimLoader;
use odmld_types::{FeatureTag, LoadModelResult, ModelState, OdmlError, PerformanceClass, Uuid};
use tokio::sync::{mpsc, Mutex};

use crate::installer::LocalDirInstaller;
use crate::paths::daemon_store_path;
use crate::session_state::SessionStateManager;

/// Bundles the per-process collaborators (§5) and exposes the six
/// IPC-facing operations named in §6, each invoked exactly once per call
/// with an OK-shaped payload or an error code (never a silent drop).
pub struct Runtime {
    loader: Arc<PlatformModelLoader>,
    library: Arc<dyn InferenceLibrary>,
    safety: SafetyBridge,
    cache: Mutex<EmbeddingCache>,
    pub session_state: Arc<SessionStateManager>,
}

impl Runtime {
    pub fn new(shim_root: PathBuf, model_root: PathBuf, cache_root: PathBuf, cache_ttl_secs: u64) -> Self {
        let shim = Arc::new(ShimLoader::new(Arc::new(odmld_shim::FixedPathInstaller {
            path: shim_root,
        })));
        let library: Arc<dyn InferenceLibrary> = Arc::new(ShimInferenceLibrary::new(shim));
        let installer = Arc::new(LocalDirInstaller { root: model_root });
        let loader = PlatformModelLoader::new(library.clone(), installer.clone(), installer);
        let safety = SafetyBridge::new(library.clone());

        // Cache path is user-scoped once a primary user logs in; until then
        // this falls back to a shared location under the cache root.
        let cache_path = daemon_store_path(&cache_root, "shared", "embeddings", "store.json");
        let cache = Mutex::new(EmbeddingCache::open(cache_path, cache_ttl_secs * 1000));

        Self {
            loader,
            library,
            safety,
            cache,
            session_state: Arc::new(SessionStateManager::new()),
        }
    }

    pub async fn load_platform_model(
        &self,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
    ) -> LoadModelResult {
        let result = self.loader.load_with_uuid(uuid, progress_observer).await;
        load_model_result_of(&result)
    }

    pub async fn load_platform_text_safety_model(
        &self,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
    ) -> LoadModelResult {
        let result = self
            .loader
            .load_text_safety_with_uuid(uuid, progress_observer)
            .await;
        load_model_result_of(&result)
    }

    pub async fn get_platform_model_state(&self, uuid: Uuid) -> ModelState {
        self.loader.get_model_state(uuid).await
    }

    pub async fn get_estimated_performance_class(&self) -> PerformanceClass {
        performance::estimate_class(self.library.as_ref())
            .await
            .unwrap_or(PerformanceClass::Error)
    }

    pub async fn format_input(
        &self,
        uuid: Uuid,
        feature_tag: FeatureTag,
        field_map: &HashMap<String, String>,
    ) -> Result<Option<String>, OdmlError> {
        self.safety
            .format_input(uuid, feature_tag, field_map)
            .await
            .map_err(OdmlError::from)
    }

    pub async fn validate_safety_result(
        &self,
        feature_tag: FeatureTag,
        text: &str,
        scores: &[f32],
    ) -> Result<bool, OdmlError> {
        self.safety
            .validate_safety_result(feature_tag, text, scores)
            .await
            .map_err(OdmlError::from)
    }

    /// Flushes the embedding cache to disk; called periodically and on
    /// shutdown (§4.8 `Sync`).
    pub async fn sync_cache(&self) -> bool {
        self.cache.lock().await.sync()
    }

    pub async fn cache_put(&self, key: String, embedding: Vec<f32>) {
        self.cache.lock().await.put(key, embedding);
    }

    pub async fn cache_get(&self, key: &str) -> Option<Vec<f32>> {
        self.cache.lock().await.get(key)
    }
}
