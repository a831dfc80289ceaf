//! Raw entry-point signatures exposed by the shim dynamic library.
//!
//! These mirror the logical capability table in spec's §4.2 at the C ABI
//! level: opaque handles are passed as `u64`, strings as UTF-8 byte
//! pointers with an explicit length, and "insufficient storage" is signaled
//! by a negative return carrying the required length.

use std::sync::atomic::AtomicBool;

use libc::{c_char, c_float, c_void, size_t};

pub(crate) const SYM_CREATE_MODEL: &str = "OdmlCreateModel";
pub(crate) const SYM_DESTROY_MODEL: &str = "OdmlDestroyModel";
pub(crate) const SYM_CREATE_SESSION: &str = "OdmlCreateSession";
pub(crate) const SYM_CLONE_SESSION: &str = "OdmlCloneSession";
pub(crate) const SYM_DESTROY_SESSION: &str = "OdmlDestroySession";
pub(crate) const SYM_APPEND: &str = "OdmlAppend";
pub(crate) const SYM_SIZE_IN_TOKENS: &str = "OdmlSizeInTokens";
pub(crate) const SYM_SCORE: &str = "OdmlScore";
pub(crate) const SYM_LOAD_ADAPTATION: &str = "OdmlLoadAdaptation";
pub(crate) const SYM_CLASSIFY_TEXT_SAFETY: &str = "OdmlClassifyTextSafety";
pub(crate) const SYM_FORMAT_INPUT: &str = "OdmlFormatInput";
pub(crate) const SYM_VALIDATE_SAFETY_RESULT: &str = "OdmlValidateSafetyResult";
pub(crate) const SYM_RUN_BENCHMARK: &str = "OdmlRunBenchmark";
pub(crate) const SYM_EXECUTE: &str = "OdmlExecute";
pub(crate) const SYM_DETECT_LANGUAGE: &str = "OdmlDetectLanguage";

/// Writes the BCP-47 language tag into `out_lang` (truncated to
/// `out_lang_cap`) and the confidence into `out_confidence`; returns 0 on a
/// positive detection, 1 when the library declined to guess, <0 on error.
pub(crate) type FnDetectLanguage = unsafe extern "C" fn(
    model: u64,
    text: *const c_char,
    text_len: size_t,
    out_lang: *mut c_char,
    out_lang_cap: size_t,
    out_confidence: *mut c_float,
) -> i32;

/// `kind`: 0 = chunk, 1 = terminal summary, 2 = execution failed (§4.3).
pub(crate) type ExecuteCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    kind: i32,
    text: *const c_char,
    text_len: size_t,
    output_token_count: u32,
);

pub(crate) type FnExecute = unsafe extern "C" fn(
    session: u64,
    model: u64,
    adaptation_id: i64,
    max_output_tokens: u32,
    cancel_flag: *const AtomicBool,
    callback: ExecuteCallback,
    user_data: *mut c_void,
) -> i32;

pub(crate) type FnCreateModel = unsafe extern "C" fn(
    weight_path: *const c_char,
    max_tokens: u32,
    adaptation_ranks: *const u32,
    n_adaptation_ranks: size_t,
    out_handle: *mut u64,
) -> i32;

pub(crate) type FnDestroyModel = unsafe extern "C" fn(handle: u64) -> i32;

pub(crate) type FnCreateSession =
    unsafe extern "C" fn(model: u64, adaptation_id: i64, out_handle: *mut u64) -> i32;

pub(crate) type FnCloneSession = unsafe extern "C" fn(session: u64, out_handle: *mut u64) -> i32;

pub(crate) type FnDestroySession = unsafe extern "C" fn(session: u64) -> i32;

/// Saves `text` into the session's retained context (§4.3 `append`), a
/// distinct call from `FnSizeInTokens`'s dry-run count.
pub(crate) type FnAppend =
    unsafe extern "C" fn(session: u64, text: *const c_char, text_len: size_t) -> i32;

pub(crate) type FnSizeInTokens = unsafe extern "C" fn(
    session: u64,
    text: *const c_char,
    text_len: size_t,
    out_count: *mut u32,
) -> i32;

pub(crate) type FnScore = unsafe extern "C" fn(
    session: u64,
    text: *const c_char,
    text_len: size_t,
    out_score: *mut c_float,
) -> i32;

pub(crate) type FnLoadAdaptation = unsafe extern "C" fn(
    model: u64,
    weight_path: *const c_char,
    out_adaptation_id: *mut u32,
) -> i32;

/// Returns the number of floats written, or `-required_len` if `out_scores`
/// was too small (§4.2 "insufficient storage" signal).
pub(crate) type FnClassifyTextSafety = unsafe extern "C" fn(
    model: u64,
    text: *const c_char,
    text_len: size_t,
    out_scores: *mut c_float,
    out_scores_cap: size_t,
) -> i64;

pub(crate) type FnFormatInput = unsafe extern "C" fn(
    uuid: *const c_char,
    feature_tag: u32,
    field_map_json: *const c_char,
    out_buf: *mut c_char,
    out_buf_cap: size_t,
) -> i64;

pub(crate) type FnValidateSafetyResult = unsafe extern "C" fn(
    feature_tag: u32,
    text: *const c_char,
    text_len: size_t,
    scores: *const c_float,
    n_scores: size_t,
) -> i32;

pub(crate) type FnRunBenchmark = unsafe extern "C" fn(
    out_device_heap_bytes: *mut u64,
    out_max_buffer_bytes: *mut u64,
    out_input_tok_s: *mut c_float,
    out_output_tok_s: *mut c_float,
    out_is_integrated_gpu: *mut i32,
) -> i32;
