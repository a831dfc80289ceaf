use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use odmld_shim::ShimLoader;
use odmld_types::{DetectedLanguage, FeatureTag, Uuid};
use tokio::sync::{mpsc, Mutex};

use crate::error::BindingError;
use crate::handles::{AdaptationId, CancelToken, ModelHandle, SessionHandle};
use crate::library::InferenceLibrary;
use crate::params::{
    BenchmarkSample, CreateModelParams, ExecuteOptions, LibraryStreamEvent,
};
use crate::shim_abi::{self, ExecuteCallback};
use crate::worker::ModelWorker;

fn cstring_from_path(path: &Path) -> Result<CString, BindingError> {
    let s = path
        .to_str()
        .ok_or_else(|| BindingError::ExecutionFailed(format!("non-UTF-8 path: {}", path.display())))?;
    CString::new(s).map_err(|_| BindingError::ExecutionFailed("path contains NUL byte".into()))
}

fn cstring_from_str(s: &str) -> Result<CString, BindingError> {
    CString::new(s).map_err(|_| BindingError::ExecutionFailed("text contains NUL byte".into()))
}

/// Shim-backed `InferenceLibrary`: every entry point is resolved by name
/// through `ShimLoader::lookup` and, for model/session-scoped calls, run on
/// that model's dedicated `ModelWorker` (§4.2, §5).
pub struct ShimInferenceLibrary {
    shim: Arc<ShimLoader>,
    workers: Mutex<HashMap<ModelHandle, Arc<ModelWorker>>>,
    session_owner: Mutex<HashMap<SessionHandle, ModelHandle>>,
}

impl ShimInferenceLibrary {
    pub fn new(shim: Arc<ShimLoader>) -> Self {
        Self {
            shim,
            workers: Mutex::new(HashMap::new()),
            session_owner: Mutex::new(HashMap::new()),
        }
    }

    async fn worker_for(&self, model: ModelHandle) -> Result<Arc<ModelWorker>, BindingError> {
        self.workers
            .lock()
            .await
            .get(&model)
            .cloned()
            .ok_or(BindingError::UnknownModel(model))
    }

    async fn worker_for_session(&self, session: SessionHandle) -> Result<Arc<ModelWorker>, BindingError> {
        let model = *self
            .session_owner
            .lock()
            .await
            .get(&session)
            .ok_or(BindingError::UnknownSession(session))?;
        self.worker_for(model).await
    }

    /// Resolves a named entry point, retrying once via `ensure_ready` if the
    /// shim isn't loaded yet (§4.1 retry rule). Only a failed retry surfaces
    /// as an error; shim-not-ready by itself never does.
    async fn resolve<F: Copy>(&self, name: &str) -> Result<F, BindingError> {
        if !self.shim.is_ready().await && !self.shim.ensure_ready().await {
            return Err(BindingError::ShimNotReady);
        }
        self.shim
            .lookup(name)
            .await
            .ok_or_else(|| BindingError::MissingEntryPoint(name.into()))
    }
}

unsafe extern "C" fn execute_trampoline(
    user_data: *mut c_void,
    kind: i32,
    text: *const libc::c_char,
    text_len: libc::size_t,
    output_token_count: u32,
) {
    let tx = unsafe { &*(user_data as *const mpsc::Sender<LibraryStreamEvent>) };
    let text_str = if text.is_null() || text_len == 0 {
        String::new()
    } else {
        let bytes = unsafe { std::slice::from_raw_parts(text as *const u8, text_len) };
        String::from_utf8_lossy(bytes).into_owned()
    };
    let event = match kind {
        0 => LibraryStreamEvent::Chunk {
            text: text_str,
            safety_info: None,
        },
        1 => LibraryStreamEvent::Done {
            safety_info: None,
            output_token_count,
        },
        _ => LibraryStreamEvent::ExecutionFailed(text_str),
    };
    let _ = tx.blocking_send(event);
}

#[async_trait]
impl InferenceLibrary for ShimInferenceLibrary {
    async fn create_model(&self, params: CreateModelParams) -> Result<ModelHandle, BindingError> {
        let create: shim_abi::FnCreateModel = self.resolve(shim_abi::SYM_CREATE_MODEL).await?;
        let weight_path = cstring_from_path(&params.weight_path)?;
        let ranks = params.adaptation_ranks.clone();
        let max_tokens = params.max_tokens;

        let worker = ModelWorker::spawn();
        let handle_value: Result<u64, BindingError> = worker
            .post(move || {
                let mut out_handle: u64 = 0;
                let rc = unsafe {
                    create(
                        weight_path.as_ptr(),
                        max_tokens,
                        ranks.as_ptr(),
                        ranks.len(),
                        &mut out_handle,
                    )
                };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!(
                        "create-model returned {rc}"
                    )))
                } else {
                    Ok(out_handle)
                }
            })
            .await;
        let handle = ModelHandle(handle_value?);
        self.workers.lock().await.insert(handle, Arc::new(worker));
        Ok(handle)
    }

    async fn destroy_model(&self, model: ModelHandle) -> Result<(), BindingError> {
        let destroy: shim_abi::FnDestroyModel = self.resolve(shim_abi::SYM_DESTROY_MODEL).await?;
        let worker = self.worker_for(model).await?;
        let rc: i32 = worker.post(move || unsafe { destroy(model.0) }).await;
        self.workers.lock().await.remove(&model);
        if rc != 0 {
            return Err(BindingError::ExecutionFailed(format!(
                "destroy-model returned {rc}"
            )));
        }
        Ok(())
    }

    async fn create_session(
        &self,
        model: ModelHandle,
        adaptation: Option<AdaptationId>,
    ) -> Result<SessionHandle, BindingError> {
        let create: shim_abi::FnCreateSession = self.resolve(shim_abi::SYM_CREATE_SESSION).await?;
        let worker = self.worker_for(model).await?;
        let adaptation_id = adaptation.map(|a| a.0 as i64).unwrap_or(-1);
        let result: Result<u64, BindingError> = worker
            .post(move || {
                let mut out_handle: u64 = 0;
                let rc = unsafe { create(model.0, adaptation_id, &mut out_handle) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!(
                        "create-session returned {rc}"
                    )))
                } else {
                    Ok(out_handle)
                }
            })
            .await;
        let handle = SessionHandle(result?);
        self.session_owner.lock().await.insert(handle, model);
        Ok(handle)
    }

    async fn clone_session(&self, session: SessionHandle) -> Result<SessionHandle, BindingError> {
        let clone_fn: shim_abi::FnCloneSession = self.resolve(shim_abi::SYM_CLONE_SESSION).await?;
        let worker = self.worker_for_session(session).await?;
        let result: Result<u64, BindingError> = worker
            .post(move || {
                let mut out_handle: u64 = 0;
                let rc = unsafe { clone_fn(session.0, &mut out_handle) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!(
                        "clone-session returned {rc}"
                    )))
                } else {
                    Ok(out_handle)
                }
            })
            .await;
        let handle = SessionHandle(result?);
        let model = *self
            .session_owner
            .lock()
            .await
            .get(&session)
            .ok_or(BindingError::UnknownSession(session))?;
        self.session_owner.lock().await.insert(handle, model);
        Ok(handle)
    }

    async fn destroy_session(&self, session: SessionHandle) -> Result<(), BindingError> {
        let destroy: shim_abi::FnDestroySession = self.resolve(shim_abi::SYM_DESTROY_SESSION).await?;
        let worker = self.worker_for_session(session).await?;
        let rc: i32 = worker.post(move || unsafe { destroy(session.0) }).await;
        self.session_owner.lock().await.remove(&session);
        if rc != 0 {
            return Err(BindingError::ExecutionFailed(format!(
                "destroy-session returned {rc}"
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        session: SessionHandle,
        model: ModelHandle,
        options: ExecuteOptions,
        cancel: CancelToken,
    ) -> Result<mpsc::Receiver<LibraryStreamEvent>, BindingError> {
        let execute_fn: shim_abi::FnExecute = self.resolve(shim_abi::SYM_EXECUTE).await?;
        let worker = self.worker_for_session(session).await?;
        let (tx, rx) = mpsc::channel(32);
        let adaptation_id = options.adaptation_id.map(|a| a.0 as i64).unwrap_or(-1);
        let max_output_tokens = options.max_output_tokens;
        let cancel_ptr = cancel.raw_flag_ptr();
        let cancel_keep_alive = cancel;

        worker
            .post(move || {
                let _keep_alive = cancel_keep_alive;
                let sender_box = Box::new(tx);
                let user_data = Box::into_raw(sender_box) as *mut c_void;
                let callback: ExecuteCallback = execute_trampoline;
                let _rc = unsafe {
                    execute_fn(
                        session.0,
                        model.0,
                        adaptation_id,
                        max_output_tokens,
                        cancel_ptr,
                        callback,
                        user_data,
                    )
                };
                unsafe {
                    drop(Box::from_raw(
                        user_data as *mut mpsc::Sender<LibraryStreamEvent>,
                    ));
                }
            })
            .await;
        Ok(rx)
    }

    async fn append(&self, session: SessionHandle, text: &str) -> Result<(), BindingError> {
        let append_fn: shim_abi::FnAppend = self.resolve(shim_abi::SYM_APPEND).await?;
        let worker = self.worker_for_session(session).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();
        worker
            .post(move || {
                let rc = unsafe { append_fn(session.0, text.as_ptr(), text_len) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!("append returned {rc}")))
                } else {
                    Ok(())
                }
            })
            .await
    }

    async fn size_in_tokens(&self, session: SessionHandle, text: &str) -> Result<u32, BindingError> {
        let size_fn: shim_abi::FnSizeInTokens = self.resolve(shim_abi::SYM_SIZE_IN_TOKENS).await?;
        let worker = self.worker_for_session(session).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();
        worker
            .post(move || {
                let mut out_count: u32 = 0;
                let rc = unsafe { size_fn(session.0, text.as_ptr(), text_len, &mut out_count) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!(
                        "size-in-tokens returned {rc}"
                    )))
                } else {
                    Ok(out_count)
                }
            })
            .await
    }

    async fn score(&self, session: SessionHandle, text: &str) -> Result<f32, BindingError> {
        let score_fn: shim_abi::FnScore = self.resolve(shim_abi::SYM_SCORE).await?;
        let worker = self.worker_for_session(session).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();
        worker
            .post(move || {
                let mut out_score: f32 = 0.0;
                let rc = unsafe { score_fn(session.0, text.as_ptr(), text_len, &mut out_score) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!("score returned {rc}")))
                } else {
                    Ok(out_score)
                }
            })
            .await
    }

    async fn detect_language(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Option<DetectedLanguage>, BindingError> {
        let detect_fn: shim_abi::FnDetectLanguage = self.resolve(shim_abi::SYM_DETECT_LANGUAGE).await?;
        let worker = self.worker_for(model).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();
        worker
            .post(move || {
                let mut lang_buf = vec![0i8; 16];
                let mut confidence: f32 = 0.0;
                let rc = unsafe {
                    detect_fn(
                        model.0,
                        text.as_ptr(),
                        text_len,
                        lang_buf.as_mut_ptr(),
                        lang_buf.len(),
                        &mut confidence,
                    )
                };
                match rc {
                    0 => {
                        let nul = lang_buf.iter().position(|c| *c == 0).unwrap_or(lang_buf.len());
                        let bytes: Vec<u8> = lang_buf[..nul].iter().map(|c| *c as u8).collect();
                        Ok(Some(DetectedLanguage {
                            language: String::from_utf8_lossy(&bytes).into_owned(),
                            confidence,
                        }))
                    }
                    1 => Ok(None),
                    rc => Err(BindingError::ExecutionFailed(format!(
                        "detect-language returned {rc}"
                    ))),
                }
            })
            .await
    }

    async fn load_adaptation(
        &self,
        model: ModelHandle,
        weight_path: &Path,
    ) -> Result<AdaptationId, BindingError> {
        let load_fn: shim_abi::FnLoadAdaptation = self.resolve(shim_abi::SYM_LOAD_ADAPTATION).await?;
        let worker = self.worker_for(model).await?;
        let weight_path = cstring_from_path(weight_path)?;
        worker
            .post(move || {
                let mut out_id: u32 = 0;
                let rc = unsafe { load_fn(model.0, weight_path.as_ptr(), &mut out_id) };
                if rc != 0 {
                    Err(BindingError::ExecutionFailed(format!(
                        "load-adaptation returned {rc}"
                    )))
                } else {
                    Ok(AdaptationId(out_id))
                }
            })
            .await
    }

    async fn classify_text_safety(
        &self,
        model: ModelHandle,
        text: &str,
    ) -> Result<Vec<f32>, BindingError> {
        let classify_fn: shim_abi::FnClassifyTextSafety =
            self.resolve(shim_abi::SYM_CLASSIFY_TEXT_SAFETY).await?;
        let worker = self.worker_for(model).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();

        let mut cap: usize = 16;
        loop {
            let text = text.clone();
            let attempt: Result<Vec<f32>, BindingError> = worker
                .post(move || {
                    let mut buf = vec![0f32; cap];
                    let written = unsafe {
                        classify_fn(model.0, text.as_ptr(), text_len, buf.as_mut_ptr(), cap)
                    };
                    if written >= 0 {
                        buf.truncate(written as usize);
                        Ok(buf)
                    } else {
                        Err(BindingError::ExecutionFailed(format!(
                            "needs-more:{}",
                            -written
                        )))
                    }
                })
                .await;
            match attempt {
                Ok(scores) => return Ok(scores),
                Err(BindingError::ExecutionFailed(msg)) if msg.starts_with("needs-more:") => {
                    let required: usize = msg["needs-more:".len()..].parse().unwrap_or(cap * 2);
                    if required <= cap {
                        return Err(BindingError::ExecutionFailed(
                            "classify-text-safety reported insufficient storage twice".into(),
                        ));
                    }
                    cap = required;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn format_input(
        &self,
        uuid: Uuid,
        feature_tag: FeatureTag,
        field_map: &HashMap<String, String>,
    ) -> Result<Option<String>, BindingError> {
        let format_fn: shim_abi::FnFormatInput = self.resolve(shim_abi::SYM_FORMAT_INPUT).await?;
        let uuid_c = cstring_from_str(&uuid.to_string())?;
        let field_map_json = serde_json::to_string(field_map)
            .map_err(|e| BindingError::ExecutionFailed(e.to_string()))?;
        let field_map_c = cstring_from_str(&field_map_json)?;
        let feature_tag_value = feature_tag.as_u32();

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0i8; 4096];
            let written = unsafe {
                format_fn(
                    uuid_c.as_ptr(),
                    feature_tag_value,
                    field_map_c.as_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                )
            };
            if written < 0 {
                return Ok(None);
            }
            let bytes: Vec<u8> = buf[..written as usize].iter().map(|c| *c as u8).collect();
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        })
        .await
        .map_err(|e| BindingError::ExecutionFailed(e.to_string()))?
    }

    async fn validate_safety_result(
        &self,
        feature_tag: FeatureTag,
        text: &str,
        scores: &[f32],
    ) -> Result<bool, BindingError> {
        let validate_fn: shim_abi::FnValidateSafetyResult =
            self.resolve(shim_abi::SYM_VALIDATE_SAFETY_RESULT).await?;
        let text = cstring_from_str(text)?;
        let text_len = text.as_bytes().len();
        let scores = scores.to_vec();
        let feature_tag_value = feature_tag.as_u32();

        tokio::task::spawn_blocking(move || {
            let rc = unsafe {
                validate_fn(
                    feature_tag_value,
                    text.as_ptr(),
                    text_len,
                    scores.as_ptr(),
                    scores.len(),
                )
            };
            Ok(rc != 0)
        })
        .await
        .map_err(|e| BindingError::ExecutionFailed(e.to_string()))?
    }

    async fn benchmark(&self) -> Result<BenchmarkSample, BindingError> {
        let bench_fn: shim_abi::FnRunBenchmark = self.resolve(shim_abi::SYM_RUN_BENCHMARK).await?;

        tokio::task::spawn_blocking(move || {
            let mut device_heap_bytes = 0u64;
            let mut max_buffer_bytes = 0u64;
            let mut input_tok_s = 0f32;
            let mut output_tok_s = 0f32;
            let mut is_integrated_gpu = 0i32;
            let rc = unsafe {
                bench_fn(
                    &mut device_heap_bytes,
                    &mut max_buffer_bytes,
                    &mut input_tok_s,
                    &mut output_tok_s,
                    &mut is_integrated_gpu,
                )
            };
            if rc != 0 {
                return Err(BindingError::ExecutionFailed(format!(
                    "benchmark returned {rc}"
                )));
            }
            Ok(BenchmarkSample {
                device_heap_bytes,
                max_buffer_bytes,
                input_tokens_per_sec: input_tok_s,
                output_tokens_per_sec: output_tok_s,
                is_integrated_gpu: is_integrated_gpu != 0,
            })
        })
        .await
        .map_err(|e| BindingError::ExecutionFailed(e.to_string()))?
    }
}
