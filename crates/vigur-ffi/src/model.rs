//! Model handle lifecycle.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use vigur::{Dtype, Embedder, EmbedderBuilder};

use crate::error::{ErrorKind, set_engine_error, set_last_error};
use crate::{ffi_guard, runtime};

/// Opaque handle to a loaded model. Created by `load_model`, released by
/// `free_handle`.
pub struct EmbedderHandle {
    pub(crate) inner: Arc<Embedder>,
}

/// Borrow a C string, recording an error on NULL or invalid UTF-8.
pub(crate) unsafe fn required_str<'a>(ptr: *const c_char, name: &str) -> Option<&'a str> {
    if ptr.is_null() {
        set_last_error(ErrorKind::InvalidConfig, &format!("{name} must not be NULL"));
        return None;
    }
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error(
                ErrorKind::InvalidConfig,
                &format!("{name} is not valid UTF-8"),
            );
            None
        }
    }
}

/// Borrow the model id, rejecting NULL, invalid UTF-8, and the empty
/// string before anything reaches the engine.
pub(crate) unsafe fn required_model_id<'a>(ptr: *const c_char) -> Option<&'a str> {
    let s = unsafe { required_str(ptr, "model_id") }?;
    if s.is_empty() {
        set_last_error(ErrorKind::InvalidConfig, "model_id must not be empty");
        return None;
    }
    Some(s)
}

/// Borrow an optional C string; NULL yields the default.
pub(crate) unsafe fn optional_str<'a>(
    ptr: *const c_char,
    name: &str,
    default: &'a str,
) -> Option<&'a str> {
    if ptr.is_null() {
        return Some(default);
    }
    unsafe { required_str(ptr, name) }
}

/// Collect an array of C strings into owned Rust strings.
pub(crate) unsafe fn collect_strings(
    ptr: *const *const c_char,
    count: usize,
    name: &str,
) -> Option<Vec<String>> {
    if ptr.is_null() {
        set_last_error(ErrorKind::InvalidConfig, &format!("{name} must not be NULL"));
        return None;
    }
    let slice = unsafe { std::slice::from_raw_parts(ptr, count) };
    let mut out = Vec::with_capacity(count);
    for (i, &item) in slice.iter().enumerate() {
        let s = unsafe { required_str(item, &format!("{name}[{i}]")) }?;
        out.push(s.to_string());
    }
    Some(out)
}

pub(crate) fn dtype_from_code(code: i32) -> Option<Dtype> {
    match code {
        -1 => Some(Dtype::default()),
        0 => Some(Dtype::F32),
        1 => Some(Dtype::F16),
        _ => {
            set_last_error(
                ErrorKind::InvalidConfig,
                &format!("unknown dtype code {code} (expected -1, 0, or 1)"),
            );
            None
        }
    }
}

/// Borrow the embedder behind a handle, recording an error on NULL.
pub(crate) unsafe fn handle_ref<'a>(ptr: *const EmbedderHandle) -> Option<&'a EmbedderHandle> {
    if ptr.is_null() {
        set_last_error(ErrorKind::InvalidConfig, "handle must not be NULL");
        return None;
    }
    Some(unsafe { &*ptr })
}

pub(crate) async fn build_embedder(
    model_id: &str,
    revision: &str,
    dtype: Dtype,
) -> vigur::VigurResult<Embedder> {
    EmbedderBuilder::new(model_id)
        .revision(revision)
        .dtype(dtype)
        .build()
        .await
}

/// Load a model and return an owned handle.
///
/// `model_type` is reserved for future model families and currently ignored.
/// `revision` may be NULL for the default branch. `dtype` is -1 for the
/// model default, 0 for F32, 1 for F16.
///
/// Returns NULL on failure with the error retrievable via `get_last_error`
/// (`MODEL_NOT_FOUND` for unknown ids, `INVALID_CONFIG` for bad arguments).
///
/// # Safety
///
/// `model_id` and `revision` must be NULL or valid NUL-terminated strings
/// that outlive this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn load_model(
    model_type: u8,
    model_id: *const c_char,
    revision: *const c_char,
    dtype: i32,
) -> *mut EmbedderHandle {
    let _ = model_type;
    ffi_guard("load_model", std::ptr::null_mut(), || {
        let model_id = match unsafe { required_model_id(model_id) } {
            Some(s) => s,
            None => return std::ptr::null_mut(),
        };
        let revision = match unsafe { optional_str(revision, "revision", "main") } {
            Some(s) => s,
            None => return std::ptr::null_mut(),
        };
        let dtype = match dtype_from_code(dtype) {
            Some(d) => d,
            None => return std::ptr::null_mut(),
        };
        match runtime().block_on(build_embedder(model_id, revision, dtype)) {
            Ok(embedder) => Box::into_raw(Box::new(EmbedderHandle {
                inner: Arc::new(embedder),
            })),
            Err(e) => {
                set_engine_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Embedding dimension of a loaded model, or -1 on a NULL handle.
///
/// # Safety
///
/// `handle` must be NULL or a live handle from `load_model`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn model_dimension(handle: *const EmbedderHandle) -> i32 {
    ffi_guard("model_dimension", -1, || {
        match unsafe { handle_ref(handle) } {
            Some(h) => h.inner.dimension() as i32,
            None => -1,
        }
    })
}

/// Release a handle returned by `load_model`.
///
/// NULL is a no-op. In-flight async operations keep the underlying model
/// alive until they finish.
///
/// # Safety
///
/// `handle` must be NULL or a handle from `load_model`, and must not be used
/// after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_handle(handle: *mut EmbedderHandle) {
    if handle.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(handle));
    }
}
