//! Synchronous embedding entry points.

use std::ffi::c_char;
use std::path::Path;

use vigur::{ChunkConfig, EmbeddingResult, VigurError};

use crate::error::{ErrorKind, set_engine_error, set_last_error};
use crate::model::{EmbedderHandle, collect_strings, handle_ref, required_str};
use crate::types::{
    CChunkBatch, CChunkConfig, CTextEmbedding, CTextEmbeddingBatch, batch_into_c,
    chunk_batch_into_c, embedding_into_c,
};
use crate::{ffi_guard, runtime};

/// Single-vector view of a result. Multi-vector output is an error on the
/// dense entry points.
pub(crate) fn dense_or_reject(
    result: EmbeddingResult,
    model: &str,
) -> Result<Vec<f32>, VigurError> {
    match result {
        EmbeddingResult::Dense(v) if v.is_empty() => Err(VigurError::EmbeddingFailed(
            anyhow::anyhow!("model returned an empty vector"),
        )),
        EmbeddingResult::Dense(v) => Ok(v),
        EmbeddingResult::Multi(_) => Err(VigurError::MultiVector(model.to_string())),
    }
}

/// Copy a caller-supplied config, or defaults on NULL.
pub(crate) unsafe fn chunk_config_from(ptr: *const CChunkConfig) -> ChunkConfig {
    if ptr.is_null() {
        ChunkConfig::default()
    } else {
        ChunkConfig::from(unsafe { *ptr })
    }
}

/// Embed one text into a dense vector.
///
/// Returns NULL on failure (`MULTI_VECTOR` when the model produces one
/// vector per token). The caller owns the result and frees it with
/// `free_embedding`.
///
/// # Safety
///
/// `handle` must be a live handle from `load_model`; `text` must be a valid
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embed_text(
    handle: *const EmbedderHandle,
    text: *const c_char,
) -> *mut CTextEmbedding {
    ffi_guard("embed_text", std::ptr::null_mut(), || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return std::ptr::null_mut();
        };
        let Some(text) = (unsafe { required_str(text, "text") }) else {
            return std::ptr::null_mut();
        };
        let embedder = &handle.inner;
        let result = runtime().block_on(embedder.embed(text));
        let values = result.and_then(|r| dense_or_reject(r, embedder.model_type().cli_name()));
        match values {
            Ok(v) => Box::into_raw(Box::new(embedding_into_c(v))),
            Err(e) => {
                set_engine_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Embed a batch of texts. Results are in input order and identical to
/// calling `embed_text` per item.
///
/// Returns NULL on failure; the whole batch fails if any item fails. The
/// caller frees the result with `free_embedding_batch`.
///
/// # Safety
///
/// `texts` must point to `count` valid NUL-terminated strings; `handle` must
/// be a live handle from `load_model`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embed_texts_batch(
    handle: *const EmbedderHandle,
    texts: *const *const c_char,
    count: usize,
) -> *mut CTextEmbeddingBatch {
    ffi_guard("embed_texts_batch", std::ptr::null_mut(), || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return std::ptr::null_mut();
        };
        if count == 0 {
            set_last_error(ErrorKind::InvalidConfig, "count must be at least 1");
            return std::ptr::null_mut();
        }
        let Some(texts) = (unsafe { collect_strings(texts, count, "texts") }) else {
            return std::ptr::null_mut();
        };
        let embedder = &handle.inner;
        match runtime()
            .block_on(embedder.embed_batch(&texts))
            .and_then(|results| {
                results
                    .into_iter()
                    .map(|r| dense_or_reject(r, embedder.model_type().cli_name()))
                    .collect::<Result<Vec<_>, _>>()
            }) {
            Ok(vectors) => Box::into_raw(Box::new(batch_into_c(vectors))),
            Err(e) => {
                set_engine_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Chunk a file and embed every chunk.
///
/// `config` may be NULL for defaults. Returns NULL on failure
/// (`FILE_NOT_FOUND`, `UNSUPPORTED_FORMAT`, `FILE_READ_ERROR`). The caller
/// frees the result with `free_chunk_batch`.
///
/// # Safety
///
/// `handle` must be a live handle from `load_model`; `path` must be a valid
/// NUL-terminated string; `config` must be NULL or a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embed_file(
    handle: *const EmbedderHandle,
    path: *const c_char,
    config: *const CChunkConfig,
) -> *mut CChunkBatch {
    ffi_guard("embed_file", std::ptr::null_mut(), || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return std::ptr::null_mut();
        };
        let Some(path) = (unsafe { required_str(path, "path") }) else {
            return std::ptr::null_mut();
        };
        let config = unsafe { chunk_config_from(config) };
        match runtime().block_on(handle.inner.embed_file(Path::new(path), &config)) {
            Ok(chunks) => Box::into_raw(Box::new(chunk_batch_into_c(chunks))),
            Err(e) => {
                set_engine_error(&e);
                std::ptr::null_mut()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::free_handle;
    use std::ffi::{CStr, CString};

    fn load(model: &str) -> *mut EmbedderHandle {
        let id = CString::new(model).unwrap();
        let handle = unsafe { crate::load_model(0, id.as_ptr(), std::ptr::null(), -1) };
        assert!(!handle.is_null());
        handle
    }

    fn last_error() -> String {
        let ptr = crate::get_last_error();
        assert!(!ptr.is_null(), "expected a pending error");
        let msg = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { crate::free_error_string(ptr) };
        msg
    }

    #[test]
    fn embed_text_returns_model_dimension() {
        let handle = load("minilm-l6-v2");
        let text = CString::new("hello world").unwrap();
        let embedding = unsafe { embed_text(handle, text.as_ptr()) };
        assert!(!embedding.is_null());
        unsafe {
            assert_eq!((*embedding).len, 384);
            crate::free_embedding(embedding);
            free_handle(handle);
        }
    }

    #[test]
    fn multi_vector_model_is_rejected() {
        let handle = load("colbert-v2");
        let text = CString::new("hello").unwrap();
        let embedding = unsafe { embed_text(handle, text.as_ptr()) };
        assert!(embedding.is_null());
        assert!(last_error().starts_with("MULTI_VECTOR:"));
        unsafe { free_handle(handle) };
    }

    #[test]
    fn batch_matches_single_calls() {
        let handle = load("minilm-l6-v2");
        let a = CString::new("first").unwrap();
        let b = CString::new("second").unwrap();
        let ptrs = [a.as_ptr(), b.as_ptr()];

        let batch = unsafe { embed_texts_batch(handle, ptrs.as_ptr(), ptrs.len()) };
        let single = unsafe { embed_text(handle, a.as_ptr()) };
        assert!(!batch.is_null() && !single.is_null());
        unsafe {
            assert_eq!((*batch).count, 2);
            let items = std::slice::from_raw_parts((*batch).items, (*batch).count);
            let from_batch = std::slice::from_raw_parts(items[0].values, items[0].len);
            let from_single = std::slice::from_raw_parts((*single).values, (*single).len);
            assert_eq!(from_batch, from_single);
            crate::free_embedding_batch(batch);
            crate::free_embedding(single);
            free_handle(handle);
        }
    }

    #[test]
    fn empty_batch_is_invalid() {
        let handle = load("minilm-l6-v2");
        let batch = unsafe { embed_texts_batch(handle, std::ptr::null(), 0) };
        assert!(batch.is_null());
        assert!(last_error().starts_with("INVALID_CONFIG:"));
        unsafe { free_handle(handle) };
    }

    #[test]
    fn embed_file_missing_path() {
        let handle = load("minilm-l6-v2");
        let path = CString::new("/no/such/file.txt").unwrap();
        let batch = unsafe { embed_file(handle, path.as_ptr(), std::ptr::null()) };
        assert!(batch.is_null());
        assert_eq!(last_error(), "FILE_NOT_FOUND:/no/such/file.txt");
        unsafe { free_handle(handle) };
    }

    #[test]
    fn embed_file_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.xyz");
        std::fs::write(&file, "content").unwrap();
        let handle = load("minilm-l6-v2");
        let path = CString::new(file.to_str().unwrap()).unwrap();
        let batch = unsafe { embed_file(handle, path.as_ptr(), std::ptr::null()) };
        assert!(batch.is_null());
        assert_eq!(last_error(), "UNSUPPORTED_FORMAT:.xyz");
        unsafe { free_handle(handle) };
    }

    #[test]
    fn embed_file_produces_chunks_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "A small document to embed.").unwrap();
        let handle = load("minilm-l6-v2");
        let path = CString::new(file.to_str().unwrap()).unwrap();
        let batch = unsafe { embed_file(handle, path.as_ptr(), std::ptr::null()) };
        assert!(!batch.is_null());
        unsafe {
            assert_eq!((*batch).count, 1);
            let item = &*(*batch).items;
            assert_eq!(item.len, 384);
            let json = CStr::from_ptr(item.metadata_json).to_str().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(parsed["chunk_index"], "0");
            crate::free_chunk_batch(batch);
            free_handle(handle);
        }
    }
}
