use std::collections::HashMap;
use std::sync::Arc;

use odmld_binding::{CreateModelParams, InferenceLibrary, SafetyTriple};
use odmld_model::ModelWrapper;
use odmld_types::{parse_manifest, LoadModelResult, ManifestError, ModelState, OdmlError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::error::LoaderError;
use crate::installer::{DlcInstaller, DlcState, DlcStateQuery};
use crate::record::PlatformModelRecord;

const MANIFEST_FILE_NAME: &str = "model.json";

/// Resolves a UUID to a live `ModelWrapper`, with optional LoRA adaptation
/// (§4.5, component E). Tracks base models and text-safety models in
/// separate record maps since the two are independent resolution tracks
/// sharing only their install/dedup machinery, grounded on
/// `ChromeosPlatformModelLoader` in the original header.
pub struct PlatformModelLoader {
    library: Arc<dyn InferenceLibrary>,
    installer: Arc<dyn DlcInstaller>,
    state_query: Arc<dyn DlcStateQuery>,
    records: Mutex<HashMap<Uuid, PlatformModelRecord>>,
    ts_records: Mutex<HashMap<Uuid, PlatformModelRecord>>,
    /// `uuid -> base uuid` edges for every base resolution currently blocked
    /// on its own base (§4.5). A per-call `ancestors` set only catches a
    /// cycle that unwinds within one top-level call's own recursion; this
    /// loader-wide map catches the cross-call case where two independently
    /// launched `load_with_uuid` calls resolve into each other's base
    /// (A's manifest names B as its base, B's names A), which would
    /// otherwise deadlock both callers' `finish_base` forever.
    waiting_for: Mutex<HashMap<Uuid, Uuid>>,
}

impl PlatformModelLoader {
    pub fn new(
        library: Arc<dyn InferenceLibrary>,
        installer: Arc<dyn DlcInstaller>,
        state_query: Arc<dyn DlcStateQuery>,
    ) -> Arc<Self> {
        Arc::new(Self {
            library,
            installer,
            state_query,
            records: Mutex::new(HashMap::new()),
            ts_records: Mutex::new(HashMap::new()),
            waiting_for: Mutex::new(HashMap::new()),
        })
    }

    pub async fn load_with_uuid(
        self: &Arc<Self>,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
    ) -> Result<Arc<ModelWrapper>, OdmlError> {
        self.load_base(uuid, progress_observer, &mut Default::default())
            .await
    }

    pub async fn load_text_safety_with_uuid(
        self: &Arc<Self>,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
    ) -> Result<Arc<ModelWrapper>, OdmlError> {
        self.load_text_safety(uuid, progress_observer).await
    }

    pub async fn get_model_state(&self, uuid: Uuid) -> ModelState {
        let package_id = dlc_package_id(uuid);
        match self.state_query.query_state(&package_id).await {
            DlcState::Present => ModelState::Installed,
            DlcState::Installing => ModelState::Installing,
            DlcState::Absent => ModelState::NotInstalled,
            DlcState::Error => ModelState::UnknownState,
        }
    }

    /// Algorithm per §4.5 steps 1-10. `ancestors` threads the in-progress
    /// base-model chain for cycle detection (REDESIGN FLAG: resolved here,
    /// an Open Question in the source spec).
    async fn load_base(
        self: &Arc<Self>,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
        ancestors: &mut std::collections::HashSet<Uuid>,
    ) -> Result<Arc<ModelWrapper>, OdmlError> {
        if !ancestors.insert(uuid) {
            return Err(LoaderError::CyclicBaseModel(uuid).into());
        }

        let (rx, is_launcher) = {
            let mut records = self.records.lock().await;
            let record = records.entry(uuid).or_default();
            if let Some(wrapper) = record.resolved(None) {
                return Ok(wrapper);
            }
            let (tx, rx) = oneshot::channel();
            let is_launcher = !record.is_in_flight();
            record.push_pending(tx);
            if let Some(observer) = progress_observer {
                record.push_observer(observer);
            }
            (rx, is_launcher)
        };

        if is_launcher {
            let this = Arc::clone(self);
            let mut ancestors = ancestors.clone();
            tokio::spawn(async move {
                let result = this.resolve_base(uuid, &mut ancestors).await;
                this.finish_base(uuid, result).await;
            });
        }

        rx.await.unwrap_or(Err(OdmlError::UnknownError(
            "platform model loader dropped the pending load".into(),
        )))
    }

    async fn resolve_base(
        self: &Arc<Self>,
        uuid: Uuid,
        ancestors: &mut std::collections::HashSet<Uuid>,
    ) -> Result<Arc<ModelWrapper>, OdmlError> {
        let package_root = self.install_and_track_progress(uuid, false).await?;
        let manifest = self.read_manifest(&package_root).await?;

        if manifest.is_base() {
            let params = CreateModelParams {
                weight_path: manifest.weight_path,
                max_tokens: manifest.max_tokens,
                adaptation_ranks: manifest.adaptation_ranks,
                safety_triple: safety_triple_from(&manifest.ts_data_path, &manifest.ts_sp_model_path, manifest.ts_dimension),
            };
            let handle = self
                .library
                .create_model(params)
                .await
                .map_err(OdmlError::from)?;
            let wrapper = ModelWrapper::new(handle, manifest.max_tokens, self.library.clone());
            let mut records = self.records.lock().await;
            records.entry(uuid).or_default().publish(&wrapper, manifest.version);
            Ok(wrapper)
        } else {
            let base_ref = manifest.base_model.expect("adaptation manifest carries base_model");

            {
                let mut waiting = self.waiting_for.lock().await;
                if would_create_wait_cycle(&waiting, base_ref.uuid, uuid) {
                    return Err(LoaderError::CyclicBaseModel(uuid).into());
                }
                waiting.insert(uuid, base_ref.uuid);
            }
            let base_result = self.load_base(base_ref.uuid, None, ancestors).await;
            self.waiting_for.lock().await.remove(&uuid);
            let base_wrapper = base_result?;

            let resolved_version = {
                let records = self.records.lock().await;
                records
                    .get(&base_ref.uuid)
                    .and_then(|r| r.version())
                    .map(str::to_owned)
            };
            if resolved_version.as_deref() != Some(base_ref.version.as_str()) {
                return Err(LoaderError::BaseVersionMismatch {
                    expected: base_ref.version,
                    resolved: resolved_version.unwrap_or_default(),
                }
                .into());
            }

            let adaptation_id = base_wrapper
                .load_adaptation(manifest.weight_path)
                .await
                .map_err(OdmlError::from)?;
            let child = ModelWrapper::new_adapted(base_wrapper, adaptation_id);
            let mut records = self.records.lock().await;
            records.entry(uuid).or_default().publish(&child, manifest.version);
            Ok(child)
        }
    }

    async fn load_text_safety(
        self: &Arc<Self>,
        uuid: Uuid,
        progress_observer: Option<mpsc::UnboundedSender<f32>>,
    ) -> Result<Arc<ModelWrapper>, OdmlError> {
        let (rx, is_launcher) = {
            let mut records = self.ts_records.lock().await;
            let record = records.entry(uuid).or_default();
            if let Some(wrapper) = record.resolved(None) {
                return Ok(wrapper);
            }
            let (tx, rx) = oneshot::channel();
            let is_launcher = !record.is_in_flight();
            record.push_pending(tx);
            if let Some(observer) = progress_observer {
                record.push_observer(observer);
            }
            (rx, is_launcher)
        };

        if is_launcher {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let result = this.resolve_text_safety(uuid).await;
                this.finish_text_safety(uuid, result).await;
            });
        }

        rx.await.unwrap_or(Err(OdmlError::UnknownError(
            "platform model loader dropped the pending load".into(),
        )))
    }

    async fn resolve_text_safety(self: &Arc<Self>, uuid: Uuid) -> Result<Arc<ModelWrapper>, OdmlError> {
        let package_root = self.install_and_track_progress(uuid, true).await?;
        let manifest = self.read_manifest(&package_root).await?;
        let safety_triple = safety_triple_from(&manifest.ts_data_path, &manifest.ts_sp_model_path, manifest.ts_dimension)
            .ok_or_else(|| OdmlError::LoadLibraryFailed("manifest is missing its text-safety triple".into()))?;
        let params = CreateModelParams {
            weight_path: manifest.weight_path,
            max_tokens: manifest.max_tokens,
            adaptation_ranks: manifest.adaptation_ranks,
            safety_triple: Some(safety_triple),
        };
        let handle = self.library.create_model(params).await.map_err(OdmlError::from)?;
        let wrapper = ModelWrapper::new(handle, manifest.max_tokens, self.library.clone());
        let mut records = self.ts_records.lock().await;
        records.entry(uuid).or_default().publish(&wrapper, manifest.version);
        Ok(wrapper)
    }

    /// Runs the installer for `uuid`'s package, relaying every progress tick
    /// into the owning record (§4.5 step 6: `on_dlc_progress` →
    /// `update_progress` → forward to every observer).
    async fn install_and_track_progress(
        &self,
        uuid: Uuid,
        is_ts: bool,
    ) -> Result<std::path::PathBuf, OdmlError> {
        let package_id = dlc_package_id(uuid);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let records = if is_ts { &self.ts_records } else { &self.records };

        let relay = async {
            while let Some(fraction) = progress_rx.recv().await {
                records.lock().await.entry(uuid).or_default().update_progress(fraction);
            }
        };

        let install_fut = self.installer.install(&package_id, progress_tx);
        let (_, package_root) = tokio::join!(relay, install_fut);
        package_root.map_err(OdmlError::from)
    }

    async fn read_manifest(&self, package_root: &std::path::Path) -> Result<odmld_types::ModelManifest, OdmlError> {
        let manifest_path = package_root.join(MANIFEST_FILE_NAME);
        let bytes = tokio::fs::read(&manifest_path)
            .await
            .map_err(|e| OdmlError::LoadLibraryFailed(format!("reading {}: {e}", manifest_path.display())))?;
        parse_manifest(&bytes, package_root).map_err(|e: ManifestError| match e {
            ManifestError::Malformed(m) => OdmlError::LoadLibraryFailed(m),
            ManifestError::PathEscape(p) => OdmlError::InvalidArgument(format!("manifest path escapes package root: {p}")),
        })
    }

    async fn finish_base(&self, uuid: Uuid, result: Result<Arc<ModelWrapper>, OdmlError>) {
        let pending = {
            let mut records = self.records.lock().await;
            records.entry(uuid).or_default().drain_pending()
        };
        for tx in pending {
            let _ = tx.send(result.clone());
        }
    }

    async fn finish_text_safety(&self, uuid: Uuid, result: Result<Arc<ModelWrapper>, OdmlError>) {
        let pending = {
            let mut records = self.ts_records.lock().await;
            records.entry(uuid).or_default().drain_pending()
        };
        for tx in pending {
            let _ = tx.send(result.clone());
        }
    }
}

/// Would recording `dependent -> base` in the loader's wait-for map close a
/// cycle? True iff `base` already (transitively, through in-flight base
/// resolutions) leads back to `dependent` — i.e. `dependent`'s own
/// resolution is somewhere upstream of the base it's about to wait on.
fn would_create_wait_cycle(waiting: &HashMap<Uuid, Uuid>, base: Uuid, dependent: Uuid) -> bool {
    let mut current = base;
    let mut steps = 0;
    while let Some(&next) = waiting.get(&current) {
        if next == dependent {
            return true;
        }
        current = next;
        steps += 1;
        if steps > waiting.len() {
            return false;
        }
    }
    false
}

fn dlc_package_id(uuid: Uuid) -> String {
    format!("ml-dlc-{}", uuid.to_string().to_lowercase())
}

fn safety_triple_from(
    data_path: &Option<std::path::PathBuf>,
    sp_model_path: &Option<std::path::PathBuf>,
    dimension: Option<u32>,
) -> Option<SafetyTriple> {
    Some(SafetyTriple {
        data_path: data_path.clone()?,
        sp_model_path: sp_model_path.clone()?,
        dimension: dimension?,
    })
}

pub fn load_model_result_of(result: &Result<Arc<ModelWrapper>, OdmlError>) -> LoadModelResult {
    match result {
        Ok(_) => LoadModelResult::Success,
        Err(OdmlError::InvalidArgument(_)) => LoadModelResult::InvalidArgs,
        Err(OdmlError::GpuBlocked(_)) => LoadModelResult::GpuBlocked,
        Err(_) => LoadModelResult::FailedToLoadLibrary,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use odmld_binding::FakeInferenceLibrary;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_manifest(dir: &std::path::Path, body: &str) {
        std::fs::write(dir.join(MANIFEST_FILE_NAME), body).unwrap();
    }

    struct SingleUuidInstaller {
        root: PathBuf,
    }

    #[async_trait::async_trait]
    impl DlcInstaller for SingleUuidInstaller {
        async fn install(
            &self,
            _package_id: &str,
            progress_tx: mpsc::UnboundedSender<f32>,
        ) -> Result<PathBuf, LoaderError> {
            let _ = progress_tx.send(1.0);
            Ok(self.root.clone())
        }
    }

    #[async_trait::async_trait]
    impl DlcStateQuery for SingleUuidInstaller {
        async fn query_state(&self, _package_id: &str) -> DlcState {
            DlcState::Present
        }
    }

    #[tokio::test]
    async fn loads_a_base_manifest() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name":"gecko","version":"1.0","weight_path":"weights.bin"}"#,
        );
        std::fs::write(dir.path().join("weights.bin"), b"weights").unwrap();

        let library = Arc::new(FakeInferenceLibrary::new());
        let installer = Arc::new(SingleUuidInstaller { root: dir.path().to_path_buf() });
        let loader = PlatformModelLoader::new(library, installer.clone(), installer);

        let wrapper = loader.load_with_uuid(Uuid::new_v4(), None).await.unwrap();
        assert_eq!(wrapper.max_tokens(), 1024);
    }

    #[tokio::test]
    async fn concurrent_loads_of_the_same_uuid_share_one_install() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"name":"gecko","version":"1.0","weight_path":"weights.bin"}"#,
        );
        std::fs::write(dir.path().join("weights.bin"), b"weights").unwrap();

        let library = Arc::new(FakeInferenceLibrary::new());
        let installer = Arc::new(SingleUuidInstaller { root: dir.path().to_path_buf() });
        let loader = PlatformModelLoader::new(library, installer.clone(), installer);

        let uuid = Uuid::new_v4();
        let (a, b) = tokio::join!(loader.load_with_uuid(uuid, None), loader.load_with_uuid(uuid, None));
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.model_handle(), b.model_handle());
    }

    #[tokio::test]
    async fn adaptation_manifest_resolves_its_base_first() {
        let base_dir = tempdir().unwrap();
        write_manifest(
            base_dir.path(),
            r#"{"name":"base","version":"1.0","weight_path":"base.bin"}"#,
        );
        std::fs::write(base_dir.path().join("base.bin"), b"w").unwrap();

        let adapt_dir = tempdir().unwrap();
        let base_uuid = Uuid::new_v4();
        write_manifest(
            adapt_dir.path(),
            &format!(
                r#"{{"name":"adapt","version":"1.0","weight_path":"adapt.bin","base_model":{{"uuid":"{base_uuid}","version":"1.0"}}}}"#
            ),
        );
        std::fs::write(adapt_dir.path().join("adapt.bin"), b"w").unwrap();

        let library = Arc::new(FakeInferenceLibrary::new());
        let routed = Arc::new(TwoUuidInstaller {
            base_uuid,
            base_root: base_dir.path().to_path_buf(),
            adapt_root: adapt_dir.path().to_path_buf(),
        });
        let loader = PlatformModelLoader::new(library, routed.clone(), routed);

        let adapt_uuid = Uuid::new_v4();
        let base_wrapper = loader.load_with_uuid(base_uuid, None).await.unwrap();
        let adapt_wrapper = loader.load_with_uuid(adapt_uuid, None).await.unwrap();
        assert_eq!(adapt_wrapper.model_handle(), base_wrapper.model_handle());
        assert!(adapt_wrapper.default_adaptation().is_some());
    }

    struct TwoUuidInstaller {
        base_uuid: Uuid,
        base_root: PathBuf,
        adapt_root: PathBuf,
    }

    #[async_trait::async_trait]
    impl DlcInstaller for TwoUuidInstaller {
        async fn install(
            &self,
            package_id: &str,
            progress_tx: mpsc::UnboundedSender<f32>,
        ) -> Result<PathBuf, LoaderError> {
            let _ = progress_tx.send(1.0);
            if package_id == dlc_package_id(self.base_uuid) {
                Ok(self.base_root.clone())
            } else {
                Ok(self.adapt_root.clone())
            }
        }
    }

    #[async_trait::async_trait]
    impl DlcStateQuery for TwoUuidInstaller {
        async fn query_state(&self, _package_id: &str) -> DlcState {
            DlcState::Present
        }
    }

    #[tokio::test]
    async fn version_mismatch_fails_the_adaptation_load() {
        let base_dir = tempdir().unwrap();
        write_manifest(
            base_dir.path(),
            r#"{"name":"base","version":"1.0.1","weight_path":"base.bin"}"#,
        );
        std::fs::write(base_dir.path().join("base.bin"), b"w").unwrap();

        let adapt_dir = tempdir().unwrap();
        let base_uuid = Uuid::new_v4();
        write_manifest(
            adapt_dir.path(),
            &format!(
                r#"{{"name":"adapt","version":"1.0","weight_path":"adapt.bin","base_model":{{"uuid":"{base_uuid}","version":"1.0.0"}}}}"#
            ),
        );
        std::fs::write(adapt_dir.path().join("adapt.bin"), b"w").unwrap();

        let library = Arc::new(FakeInferenceLibrary::new());
        let routed = Arc::new(TwoUuidInstaller {
            base_uuid,
            base_root: base_dir.path().to_path_buf(),
            adapt_root: adapt_dir.path().to_path_buf(),
        });
        let loader = PlatformModelLoader::new(library, routed.clone(), routed);

        let adapt_uuid = Uuid::new_v4();
        let err = loader.load_with_uuid(adapt_uuid, None).await.unwrap_err();
        assert!(matches!(err, OdmlError::LoadLibraryFailed(_)));
    }

    #[tokio::test]
    async fn cyclic_base_model_reference_fails_instead_of_recursing() {
        let dir = tempdir().unwrap();
        let self_uuid = Uuid::new_v4();
        write_manifest(
            dir.path(),
            &format!(
                r#"{{"name":"loopy","version":"1.0","weight_path":"w.bin","base_model":{{"uuid":"{self_uuid}","version":"1.0"}}}}"#
            ),
        );
        std::fs::write(dir.path().join("w.bin"), b"w").unwrap();

        let library = Arc::new(FakeInferenceLibrary::new());
        let installer = Arc::new(SingleUuidInstaller { root: dir.path().to_path_buf() });
        let loader = PlatformModelLoader::new(library, installer.clone(), installer);

        let err = loader.load_with_uuid(self_uuid, None).await.unwrap_err();
        assert!(matches!(err, OdmlError::LoadLibraryFailed(_)));
    }

    /// Two independently launched top-level loads whose manifests name each
    /// other as base: A's own `ancestors` set never sees B's chain and vice
    /// versa, so only the loader-wide wait-for map catches this. Without it
    /// both calls hang forever instead of failing.
    #[tokio::test]
    async fn cross_call_base_cycle_fails_both_loads_instead_of_deadlocking() {
        let uuid_a = Uuid::new_v4();
        let uuid_b = Uuid::new_v4();

        let dir_a = tempdir().unwrap();
        write_manifest(
            dir_a.path(),
            &format!(
                r#"{{"name":"a","version":"1.0","weight_path":"w.bin","base_model":{{"uuid":"{uuid_b}","version":"1.0"}}}}"#
            ),
        );
        std::fs::write(dir_a.path().join("w.bin"), b"w").unwrap();

        let dir_b = tempdir().unwrap();
        write_manifest(
            dir_b.path(),
            &format!(
                r#"{{"name":"b","version":"1.0","weight_path":"w.bin","base_model":{{"uuid":"{uuid_a}","version":"1.0"}}}}"#
            ),
        );
        std::fs::write(dir_b.path().join("w.bin"), b"w").unwrap();

        struct MutualInstaller {
            uuid_a: Uuid,
            root_a: PathBuf,
            root_b: PathBuf,
        }

        #[async_trait::async_trait]
        impl DlcInstaller for MutualInstaller {
            async fn install(
                &self,
                package_id: &str,
                progress_tx: mpsc::UnboundedSender<f32>,
            ) -> Result<PathBuf, LoaderError> {
                let _ = progress_tx.send(1.0);
                if package_id == dlc_package_id(self.uuid_a) {
                    Ok(self.root_a.clone())
                } else {
                    Ok(self.root_b.clone())
                }
            }
        }

        #[async_trait::async_trait]
        impl DlcStateQuery for MutualInstaller {
            async fn query_state(&self, _package_id: &str) -> DlcState {
                DlcState::Present
            }
        }

        let library = Arc::new(FakeInferenceLibrary::new());
        let installer = Arc::new(MutualInstaller {
            uuid_a,
            root_a: dir_a.path().to_path_buf(),
            root_b: dir_b.path().to_path_buf(),
        });
        let loader = PlatformModelLoader::new(library, installer.clone(), installer);

        let (a, b) = tokio::join!(
            loader.load_with_uuid(uuid_a, None),
            loader.load_with_uuid(uuid_b, None)
        );
        assert!(matches!(a.unwrap_err(), OdmlError::LoadLibraryFailed(_)));
        assert!(matches!(b.unwrap_err(), OdmlError::LoadLibraryFailed(_)));
    }
}
