//! Poll-based async operations.
//!
//! `start_*` functions validate their arguments, register an operation slot,
//! spawn the work on the shared runtime, and return an operation id
//! immediately. The caller polls with `poll_async_result`: a terminal poll
//! (success, error, or cancelled) transfers ownership of the outcome and
//! removes the slot, so each operation can be consumed exactly once.

use std::collections::HashMap;
use std::ffi::{CString, c_char, c_void};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use futures::FutureExt;
use once_cell::sync::Lazy;
use vigur::{ChunkEmbedding, Embedder};

use crate::embed::{chunk_config_from, dense_or_reject};
use crate::error::{
    ErrorKind, engine_error_message, format_error, into_c_string, set_last_error,
};
use crate::model::{
    EmbedderHandle, build_embedder, collect_strings, dtype_from_code, handle_ref, optional_str,
    required_model_id, required_str,
};
use crate::types::{
    CChunkConfig, batch_into_c, chunk_batch_into_c, embedding_into_c,
};
use crate::{ffi_guard, panic_message, runtime};

static OPERATIONS: Lazy<Mutex<HashMap<i64, AsyncOperation>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_OPERATION_ID: AtomicI64 = AtomicI64::new(1);

/// Status codes returned by `poll_async_result`.
pub const ASYNC_PENDING: i32 = 0;
pub const ASYNC_SUCCESS: i32 = 1;
pub const ASYNC_ERROR: i32 = -1;
pub const ASYNC_CANCELLED: i32 = -2;
pub const ASYNC_NOT_FOUND: i32 = -3;

/// Successful outcome of an async operation, still in Rust form. Conversion
/// to C happens on the polling thread.
enum AsyncPayload {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
    Chunks(Vec<ChunkEmbedding>),
    Model(Arc<Embedder>),
}

impl AsyncPayload {
    fn result_type(&self) -> i32 {
        match self {
            Self::Single(_) => 0,
            Self::Batch(_) => 1,
            Self::Chunks(_) => 2,
            Self::Model(_) => 3,
        }
    }
}

enum OpState {
    Pending,
    Success(AsyncPayload),
    Error(String),
    Cancelled,
}

struct AsyncOperation {
    state: OpState,
    cancel: Arc<AtomicBool>,
}

/// Result of one poll. On success `data` points to a type determined by
/// `result_type` (0: CTextEmbedding, 1: CTextEmbeddingBatch, 2: CChunkBatch,
/// 3: EmbedderHandle) and is owned by the caller; free it with the matching
/// `free_*` function. On error `error_message` is owned by the caller and
/// freed with `free_async_error_message`.
#[repr(C)]
pub struct CAsyncPollResult {
    /// 0 pending, 1 success, -1 error, -2 cancelled, -3 unknown id.
    pub status: i32,
    /// Payload type on success, -1 otherwise.
    pub result_type: i32,
    pub data: *mut c_void,
    pub error_message: *mut c_char,
}

impl CAsyncPollResult {
    fn pending() -> Self {
        Self {
            status: ASYNC_PENDING,
            result_type: -1,
            data: std::ptr::null_mut(),
            error_message: std::ptr::null_mut(),
        }
    }

    fn with_status(status: i32) -> Self {
        Self {
            status,
            ..Self::pending()
        }
    }
}

fn register_operation() -> (i64, Arc<AtomicBool>) {
    let id = NEXT_OPERATION_ID.fetch_add(1, Ordering::SeqCst);
    let cancel = Arc::new(AtomicBool::new(false));
    OPERATIONS.lock().unwrap().insert(
        id,
        AsyncOperation {
            state: OpState::Pending,
            cancel: Arc::clone(&cancel),
        },
    );
    (id, cancel)
}

/// Record a completed payload, unless the operation was cancelled or its
/// slot already consumed.
fn store_success(id: i64, payload: AsyncPayload) {
    let mut ops = OPERATIONS.lock().unwrap();
    if let Some(op) = ops.get_mut(&id) {
        if op.cancel.load(Ordering::SeqCst) {
            op.state = OpState::Cancelled;
        } else if matches!(op.state, OpState::Pending) {
            op.state = OpState::Success(payload);
        }
    }
}

fn store_error(id: i64, message: String) {
    let mut ops = OPERATIONS.lock().unwrap();
    if let Some(op) = ops.get_mut(&id) {
        if op.cancel.load(Ordering::SeqCst) {
            op.state = OpState::Cancelled;
        } else if matches!(op.state, OpState::Pending) {
            op.state = OpState::Error(message);
        }
    }
}

fn store_cancelled(id: i64) {
    let mut ops = OPERATIONS.lock().unwrap();
    if let Some(op) = ops.get_mut(&id) {
        if matches!(op.state, OpState::Pending) {
            op.state = OpState::Cancelled;
        }
    }
}

/// Spawn the work for a registered operation. The cancel flag is checked
/// before the work starts and again when the outcome is stored. Panics
/// inside the task become an `FFI_ERROR` outcome instead of killing the
/// worker.
fn spawn_operation<F>(id: i64, cancel: Arc<AtomicBool>, work: F)
where
    F: std::future::Future<Output = Result<AsyncPayload, String>> + Send + 'static,
{
    runtime().spawn(async move {
        if cancel.load(Ordering::SeqCst) {
            store_cancelled(id);
            return;
        }
        match std::panic::AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(payload)) => store_success(id, payload),
            Ok(Err(message)) => store_error(id, message),
            Err(panic) => store_error(
                id,
                format_error(
                    ErrorKind::Ffi,
                    &format!("panic in async operation: {}", panic_message(&*panic)),
                ),
            ),
        }
    });
}

/// Begin loading a model. Returns an operation id, or -1 on invalid
/// arguments with the error set on the calling thread. The successful poll
/// payload is an `EmbedderHandle`.
///
/// # Safety
///
/// Same argument requirements as `load_model`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn start_load_model(
    model_type: u8,
    model_id: *const c_char,
    revision: *const c_char,
    dtype: i32,
) -> i64 {
    let _ = model_type;
    ffi_guard("start_load_model", -1, || {
        let Some(model_id) = (unsafe { required_model_id(model_id) }) else {
            return -1;
        };
        let Some(revision) = (unsafe { optional_str(revision, "revision", "main") }) else {
            return -1;
        };
        let Some(dtype) = dtype_from_code(dtype) else {
            return -1;
        };
        let model_id = model_id.to_string();
        let revision = revision.to_string();
        let (id, cancel) = register_operation();
        spawn_operation(id, cancel, async move {
            build_embedder(&model_id, &revision, dtype)
                .await
                .map(|e| AsyncPayload::Model(Arc::new(e)))
                .map_err(|e| engine_error_message(&e))
        });
        id
    })
}

/// Begin embedding one text. The successful poll payload is a
/// `CTextEmbedding`.
///
/// # Safety
///
/// Same argument requirements as `embed_text`. The handle may be freed while
/// the operation runs; the model stays alive until it finishes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn start_embed_text(
    handle: *const EmbedderHandle,
    text: *const c_char,
) -> i64 {
    ffi_guard("start_embed_text", -1, || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return -1;
        };
        let Some(text) = (unsafe { required_str(text, "text") }) else {
            return -1;
        };
        let embedder = Arc::clone(&handle.inner);
        let text = text.to_string();
        let (id, cancel) = register_operation();
        spawn_operation(id, cancel, async move {
            let result = embedder
                .embed(&text)
                .await
                .and_then(|r| dense_or_reject(r, embedder.model_type().cli_name()));
            result
                .map(AsyncPayload::Single)
                .map_err(|e| engine_error_message(&e))
        });
        id
    })
}

/// Begin embedding a batch of texts. The successful poll payload is a
/// `CTextEmbeddingBatch` in input order.
///
/// # Safety
///
/// Same argument requirements as `embed_texts_batch`. The strings are copied
/// before this function returns.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn start_embed_texts_batch(
    handle: *const EmbedderHandle,
    texts: *const *const c_char,
    count: usize,
) -> i64 {
    ffi_guard("start_embed_texts_batch", -1, || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return -1;
        };
        if count == 0 {
            set_last_error(ErrorKind::InvalidConfig, "count must be at least 1");
            return -1;
        }
        let Some(texts) = (unsafe { collect_strings(texts, count, "texts") }) else {
            return -1;
        };
        let embedder = Arc::clone(&handle.inner);
        let (id, cancel) = register_operation();
        spawn_operation(id, cancel, async move {
            let result = embedder.embed_batch(&texts).await.and_then(|results| {
                results
                    .into_iter()
                    .map(|r| dense_or_reject(r, embedder.model_type().cli_name()))
                    .collect::<Result<Vec<_>, _>>()
            });
            result
                .map(AsyncPayload::Batch)
                .map_err(|e| engine_error_message(&e))
        });
        id
    })
}

/// Begin chunking and embedding a file. Missing files and unsupported
/// extensions fail fast with -1 instead of spawning work. The successful
/// poll payload is a `CChunkBatch`.
///
/// # Safety
///
/// Same argument requirements as `embed_file`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn start_embed_file(
    handle: *const EmbedderHandle,
    path: *const c_char,
    config: *const CChunkConfig,
) -> i64 {
    ffi_guard("start_embed_file", -1, || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return -1;
        };
        let Some(path) = (unsafe { required_str(path, "path") }) else {
            return -1;
        };
        let path = PathBuf::from(path);
        if !path.exists() {
            set_last_error(ErrorKind::FileNotFound, &path.display().to_string());
            return -1;
        }
        if !vigur::chunk::is_supported(&path) {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            set_last_error(ErrorKind::UnsupportedFormat, &format!(".{ext}"));
            return -1;
        }
        let config = unsafe { chunk_config_from(config) };
        let embedder = Arc::clone(&handle.inner);
        let (id, cancel) = register_operation();
        spawn_operation(id, cancel, async move {
            embedder
                .embed_file(&path, &config)
                .await
                .map(AsyncPayload::Chunks)
                .map_err(|e| engine_error_message(&e))
        });
        id
    })
}

fn payload_into_result(payload: AsyncPayload) -> CAsyncPollResult {
    let result_type = payload.result_type();
    let data: *mut c_void = match payload {
        AsyncPayload::Single(v) => Box::into_raw(Box::new(embedding_into_c(v))) as *mut c_void,
        AsyncPayload::Batch(v) => Box::into_raw(Box::new(batch_into_c(v))) as *mut c_void,
        AsyncPayload::Chunks(v) => Box::into_raw(Box::new(chunk_batch_into_c(v))) as *mut c_void,
        AsyncPayload::Model(inner) => {
            Box::into_raw(Box::new(EmbedderHandle { inner })) as *mut c_void
        }
    };
    CAsyncPollResult {
        status: ASYNC_SUCCESS,
        result_type,
        data,
        error_message: std::ptr::null_mut(),
    }
}

/// Poll an operation.
///
/// Pending operations stay registered. Any terminal status removes the
/// operation, so a second poll of the same id reports -3 (unknown id).
#[unsafe(no_mangle)]
pub extern "C" fn poll_async_result(operation_id: i64) -> CAsyncPollResult {
    ffi_guard("poll_async_result", CAsyncPollResult::with_status(ASYNC_ERROR), || {
        let state = {
            let mut ops = OPERATIONS.lock().unwrap();
            let pending = match ops.get(&operation_id) {
                None => {
                    return CAsyncPollResult {
                        error_message: into_c_string(format_error(
                            ErrorKind::InvalidConfig,
                            &format!("unknown operation id {operation_id}"),
                        )),
                        ..CAsyncPollResult::with_status(ASYNC_NOT_FOUND)
                    };
                }
                Some(op) => matches!(op.state, OpState::Pending),
            };
            if pending {
                return CAsyncPollResult::pending();
            }
            // Terminal state. Consume the slot; the payload-to-C conversion
            // happens outside the lock.
            ops.remove(&operation_id).map(|op| op.state)
        };
        match state {
            Some(OpState::Success(payload)) => payload_into_result(payload),
            Some(OpState::Error(message)) => CAsyncPollResult {
                error_message: into_c_string(message),
                ..CAsyncPollResult::with_status(ASYNC_ERROR)
            },
            Some(OpState::Cancelled) => CAsyncPollResult::with_status(ASYNC_CANCELLED),
            // Unreachable given the checks above; report as an error.
            Some(OpState::Pending) | None => CAsyncPollResult::with_status(ASYNC_ERROR),
        }
    })
}

/// Request cancellation of a pending operation.
///
/// Returns 0 when the operation was still pending (its next poll reports
/// cancelled) and -1 for an unknown, consumed, or already-terminal id.
/// Cancelling finished work does not undo its result; the host still polls
/// it normally.
#[unsafe(no_mangle)]
pub extern "C" fn cancel_async_operation(operation_id: i64) -> i32 {
    ffi_guard("cancel_async_operation", -1, || {
        let mut ops = OPERATIONS.lock().unwrap();
        match ops.get_mut(&operation_id) {
            Some(op) if matches!(op.state, OpState::Pending) => {
                op.cancel.store(true, Ordering::SeqCst);
                op.state = OpState::Cancelled;
                0
            }
            Some(_) | None => -1,
        }
    })
}

/// Release an error message from `poll_async_result`.
///
/// NULL is a no-op.
///
/// # Safety
///
/// `ptr` must be NULL or an `error_message` pointer from a poll result, not
/// yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_async_error_message(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::free_handle;
    use crate::types::{CChunkBatch, CTextEmbedding, CTextEmbeddingBatch};
    use std::ffi::{CStr, CString};
    use std::time::Duration;

    fn load() -> *mut EmbedderHandle {
        let id = CString::new("minilm-l6-v2").unwrap();
        let handle = unsafe { crate::load_model(0, id.as_ptr(), std::ptr::null(), -1) };
        assert!(!handle.is_null());
        handle
    }

    fn poll_until_terminal(id: i64) -> CAsyncPollResult {
        for _ in 0..500 {
            let result = poll_async_result(id);
            if result.status != ASYNC_PENDING {
                return result;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("operation {id} never completed");
    }

    fn take_message(result: &mut CAsyncPollResult) -> String {
        assert!(!result.error_message.is_null());
        let msg = unsafe { CStr::from_ptr(result.error_message) }
            .to_str()
            .unwrap()
            .to_string();
        unsafe { free_async_error_message(result.error_message) };
        result.error_message = std::ptr::null_mut();
        msg
    }

    #[test]
    fn async_embed_text_completes() {
        let handle = load();
        let text = CString::new("async hello").unwrap();
        let id = unsafe { start_embed_text(handle, text.as_ptr()) };
        assert!(id > 0);

        let result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_SUCCESS);
        assert_eq!(result.result_type, 0);
        let embedding = result.data as *mut CTextEmbedding;
        unsafe {
            assert_eq!((*embedding).len, 384);
            crate::free_embedding(embedding);
        }

        // The slot was consumed; the id is now unknown.
        let mut again = poll_async_result(id);
        assert_eq!(again.status, ASYNC_NOT_FOUND);
        let msg = take_message(&mut again);
        assert!(msg.starts_with("INVALID_CONFIG:unknown operation id"));
        unsafe { free_handle(handle) };
    }

    #[test]
    fn async_batch_preserves_order() {
        let handle = load();
        let a = CString::new("alpha").unwrap();
        let b = CString::new("beta").unwrap();
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let id = unsafe { start_embed_texts_batch(handle, ptrs.as_ptr(), ptrs.len()) };
        assert!(id > 0);

        let result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_SUCCESS);
        assert_eq!(result.result_type, 1);
        let batch = result.data as *mut CTextEmbeddingBatch;
        unsafe {
            assert_eq!((*batch).count, 2);
            // Matches the synchronous path for the same input.
            let sync = crate::embed_text(handle, a.as_ptr());
            let items = std::slice::from_raw_parts((*batch).items, 2);
            let batch_first = std::slice::from_raw_parts(items[0].values, items[0].len);
            let sync_values = std::slice::from_raw_parts((*sync).values, (*sync).len);
            assert_eq!(batch_first, sync_values);
            crate::free_embedding(sync);
            crate::free_embedding_batch(batch);
            free_handle(handle);
        }
    }

    #[test]
    fn async_load_model_yields_handle() {
        let model = CString::new("bge-small-en-v1.5").unwrap();
        let id = unsafe { start_load_model(0, model.as_ptr(), std::ptr::null(), 0) };
        assert!(id > 0);

        let result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_SUCCESS);
        assert_eq!(result.result_type, 3);
        let handle = result.data as *mut EmbedderHandle;
        unsafe {
            assert_eq!(crate::model_dimension(handle), 384);
            free_handle(handle);
        }
    }

    #[test]
    fn empty_model_id_fails_before_spawning() {
        let model = CString::new("").unwrap();
        let id = unsafe { start_load_model(0, model.as_ptr(), std::ptr::null(), -1) };
        assert_eq!(id, -1);
        let err = crate::get_last_error();
        assert!(!err.is_null());
        let msg = unsafe { CStr::from_ptr(err) }.to_str().unwrap().to_string();
        unsafe { crate::free_error_string(err) };
        assert_eq!(msg, "INVALID_CONFIG:model_id must not be empty");
    }

    #[test]
    fn async_unknown_model_reports_error() {
        let model = CString::new("nope").unwrap();
        let id = unsafe { start_load_model(0, model.as_ptr(), std::ptr::null(), -1) };
        assert!(id > 0);

        let mut result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_ERROR);
        assert_eq!(take_message(&mut result), "MODEL_NOT_FOUND:nope");
    }

    #[test]
    fn async_multi_vector_reports_error() {
        let model = CString::new("colbert-v2").unwrap();
        let handle = unsafe { crate::load_model(0, model.as_ptr(), std::ptr::null(), -1) };
        assert!(!handle.is_null());
        let text = CString::new("hello").unwrap();
        let id = unsafe { start_embed_text(handle, text.as_ptr()) };
        assert!(id > 0);

        let mut result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_ERROR);
        assert!(take_message(&mut result).starts_with("MULTI_VECTOR:"));
        unsafe { free_handle(handle) };
    }

    #[test]
    fn async_embed_file_fast_path_validation() {
        let handle = load();
        let missing = CString::new("/no/such/file.txt").unwrap();
        let id = unsafe { start_embed_file(handle, missing.as_ptr(), std::ptr::null()) };
        assert_eq!(id, -1);
        let err = crate::get_last_error();
        let msg = unsafe { CStr::from_ptr(err) }.to_str().unwrap().to_string();
        unsafe { crate::free_error_string(err) };
        assert_eq!(msg, "FILE_NOT_FOUND:/no/such/file.txt");

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("data.xyz");
        std::fs::write(&bad, "x").unwrap();
        let path = CString::new(bad.to_str().unwrap()).unwrap();
        let id = unsafe { start_embed_file(handle, path.as_ptr(), std::ptr::null()) };
        assert_eq!(id, -1);
        let err = crate::get_last_error();
        let msg = unsafe { CStr::from_ptr(err) }.to_str().unwrap().to_string();
        unsafe { crate::free_error_string(err) };
        assert_eq!(msg, "UNSUPPORTED_FORMAT:.xyz");
        unsafe { free_handle(handle) };
    }

    #[test]
    fn async_embed_file_completes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "Async file embedding test content.").unwrap();
        let handle = load();
        let path = CString::new(file.to_str().unwrap()).unwrap();
        let id = unsafe { start_embed_file(handle, path.as_ptr(), std::ptr::null()) };
        assert!(id > 0);

        let result = poll_until_terminal(id);
        assert_eq!(result.status, ASYNC_SUCCESS);
        assert_eq!(result.result_type, 2);
        let batch = result.data as *mut CChunkBatch;
        unsafe {
            assert!((*batch).count >= 1);
            crate::free_chunk_batch(batch);
            free_handle(handle);
        }
    }

    #[test]
    fn cancel_unknown_operation_fails() {
        assert_eq!(cancel_async_operation(i64::MAX), -1);
    }

    #[test]
    fn cancel_and_completion_never_double_deliver() {
        let handle = load();
        let text = CString::new("to be cancelled").unwrap();
        let id = unsafe { start_embed_text(handle, text.as_ptr()) };
        assert!(id > 0);
        let cancelled = cancel_async_operation(id);

        let result = poll_until_terminal(id);
        if cancelled == 0 {
            assert_eq!(result.status, ASYNC_CANCELLED);
            assert!(result.data.is_null());
        } else {
            // The task won the race; its result is delivered normally.
            assert_eq!(result.status, ASYNC_SUCCESS);
            unsafe { crate::free_embedding(result.data as *mut CTextEmbedding) };
        }

        // Either way the terminal poll consumed the slot.
        let stale = poll_async_result(id);
        assert_eq!(stale.status, ASYNC_NOT_FOUND);
        unsafe { free_async_error_message(stale.error_message) };
        assert_eq!(cancel_async_operation(id), -1);
        unsafe { free_handle(handle) };
    }

    #[test]
    fn operation_ids_are_unique_and_increasing() {
        let handle = load();
        let text = CString::new("id test").unwrap();
        let first = unsafe { start_embed_text(handle, text.as_ptr()) };
        let second = unsafe { start_embed_text(handle, text.as_ptr()) };
        assert!(second > first);
        for id in [first, second] {
            let result = poll_until_terminal(id);
            assert_eq!(result.status, ASYNC_SUCCESS);
            unsafe { crate::free_embedding(result.data as *mut CTextEmbedding) };
        }
        unsafe { free_handle(handle) };
    }
}
