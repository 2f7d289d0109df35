//! Streaming callback bridge for directory embedding.

use std::ffi::{c_char, c_void};
use std::path::Path;

use crate::error::set_engine_error;
use crate::model::{EmbedderHandle, collect_strings, handle_ref, required_str};
use crate::types::{CChunkBatch, CChunkConfig, CWalkStats, chunk_batch_into_c};
use crate::{embed::chunk_config_from, ffi_guard, runtime};

/// Invoked once per embedded file with that file's chunk batch.
///
/// Ownership of the batch transfers to the host; free it with
/// `free_chunk_batch`, typically inside the callback body, or memory
/// accumulates for the duration of the walk.
pub type ChunkBatchCallback =
    Option<unsafe extern "C" fn(batch: *mut CChunkBatch, user_data: *mut c_void)>;

/// Host callback plus its context pointer. The host guarantees both stay
/// valid for the duration of the streaming call.
struct CallbackSink {
    callback: unsafe extern "C" fn(*mut CChunkBatch, *mut c_void),
    user_data: *mut c_void,
}

unsafe impl Send for CallbackSink {}

impl CallbackSink {
    /// Hand one batch to the host. The host now owns the allocation.
    fn deliver(&mut self, chunks: Vec<vigur::ChunkEmbedding>) {
        let batch = Box::into_raw(Box::new(chunk_batch_into_c(chunks)));
        unsafe { (self.callback)(batch, self.user_data) };
    }
}

/// Embed every supported file under a directory, delivering results through
/// `callback` one file at a time.
///
/// NOTE: this takes one more parameter than the other embedding entry
/// points. The trailing `stats_out` is an out-parameter that receives the
/// walk counters (files processed and skipped) on success; pass NULL to skip
/// it. Hosts binding this function by hand must include it or every argument
/// after `config` shifts.
///
/// `extensions` (with `ext_count` entries, no leading dots) narrows the walk
/// to a subset of the supported formats; NULL or empty means all of them.
/// The callback runs synchronously on the calling thread and the walk blocks
/// on it, so a slow consumer naturally backpressures the walk and at most
/// one batch is in flight. Each delivered batch is owned by the host. Files
/// that fail to read or parse are skipped and counted; the walk continues.
///
/// Returns 0 on success and -1 on failure (`FILE_NOT_FOUND` when the
/// directory does not exist, `MULTI_VECTOR` for late-interaction models).
/// On failure the callback is never invoked.
///
/// # Safety
///
/// `handle` must be a live handle from `load_model`; `dir_path` must be a
/// valid NUL-terminated string; `extensions` must be NULL or point to
/// `ext_count` valid NUL-terminated strings; `config` and `stats_out` must
/// be NULL or valid pointers; `user_data` must stay valid for the whole
/// call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn embed_directory_stream(
    handle: *const EmbedderHandle,
    dir_path: *const c_char,
    extensions: *const *const c_char,
    ext_count: usize,
    config: *const CChunkConfig,
    callback: ChunkBatchCallback,
    user_data: *mut c_void,
    stats_out: *mut CWalkStats,
) -> i32 {
    ffi_guard("embed_directory_stream", -1, || {
        let Some(handle) = (unsafe { handle_ref(handle) }) else {
            return -1;
        };
        let Some(dir) = (unsafe { required_str(dir_path, "dir_path") }) else {
            return -1;
        };
        let filter: Option<Vec<String>> = if extensions.is_null() || ext_count == 0 {
            None
        } else {
            match unsafe { collect_strings(extensions, ext_count, "extensions") } {
                Some(list) => Some(
                    list.into_iter()
                        .map(|e| e.trim_start_matches('.').to_string())
                        .collect(),
                ),
                None => return -1,
            }
        };
        let config = unsafe { chunk_config_from(config) };
        let mut sink = callback.map(|callback| CallbackSink {
            callback,
            user_data,
        });

        let outcome = runtime().block_on(handle.inner.embed_directory_stream(
            Path::new(dir),
            &config,
            filter.as_deref(),
            |chunks| {
                if let Some(sink) = sink.as_mut() {
                    sink.deliver(chunks);
                }
                true
            },
        ));

        match outcome {
            Ok(stats) => {
                if !stats_out.is_null() {
                    unsafe {
                        *stats_out = CWalkStats {
                            files_processed: stats.files_processed as u64,
                            files_skipped: stats.files_skipped as u64,
                        };
                    }
                }
                0
            }
            Err(e) => {
                set_engine_error(&e);
                -1
            }
        }
    })
}
