//! C-compatible value types and their free functions.
//!
//! Every type handed across the boundary is allocated here and reclaimed by
//! exactly one matching free function. All free functions treat NULL as a
//! no-op and must be called at most once per pointer.

use std::ffi::{CString, c_char};

use vigur::{ChunkConfig, ChunkEmbedding};

use crate::error::into_c_string;

/// A single dense embedding.
#[repr(C)]
pub struct CTextEmbedding {
    pub values: *mut f32,
    pub len: usize,
}

/// A batch of embeddings, in input order.
#[repr(C)]
pub struct CTextEmbeddingBatch {
    pub items: *mut CTextEmbedding,
    pub count: usize,
}

/// One embedded chunk: vector, source text, and JSON metadata.
#[repr(C)]
pub struct CChunkData {
    pub values: *mut f32,
    pub len: usize,
    pub text: *mut c_char,
    /// JSON object with file_path, chunk_index, total_chunks, page_number.
    pub metadata_json: *mut c_char,
}

/// A batch of embedded chunks.
#[repr(C)]
pub struct CChunkBatch {
    pub items: *mut CChunkData,
    pub count: usize,
}

/// Chunking parameters. Obtain defaults from `chunk_config_default` and
/// override fields as needed.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub max_file_size: u64,
}

/// Directory walk counters.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct CWalkStats {
    pub files_processed: u64,
    pub files_skipped: u64,
}

/// Default chunking parameters.
#[unsafe(no_mangle)]
pub extern "C" fn chunk_config_default() -> CChunkConfig {
    let config = ChunkConfig::default();
    CChunkConfig {
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        batch_size: config.batch_size,
        max_file_size: config.max_file_size,
    }
}

impl From<CChunkConfig> for ChunkConfig {
    fn from(c: CChunkConfig) -> Self {
        ChunkConfig {
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
            batch_size: c.batch_size,
            max_file_size: c.max_file_size,
        }
    }
}

pub(crate) fn vec_into_raw(values: Vec<f32>) -> (*mut f32, usize) {
    let len = values.len();
    let boxed = values.into_boxed_slice();
    (Box::into_raw(boxed) as *mut f32, len)
}

pub(crate) fn embedding_into_c(values: Vec<f32>) -> CTextEmbedding {
    let (values, len) = vec_into_raw(values);
    CTextEmbedding { values, len }
}

pub(crate) fn batch_into_c(embeddings: Vec<Vec<f32>>) -> CTextEmbeddingBatch {
    let items: Vec<CTextEmbedding> = embeddings.into_iter().map(embedding_into_c).collect();
    let count = items.len();
    let boxed = items.into_boxed_slice();
    CTextEmbeddingBatch {
        items: Box::into_raw(boxed) as *mut CTextEmbedding,
        count,
    }
}

pub(crate) fn chunk_into_c(chunk: ChunkEmbedding) -> CChunkData {
    let (values, len) = vec_into_raw(chunk.embedding);
    let meta = &chunk.chunk.metadata;
    // All values are strings so hosts can treat the object as a flat
    // string map. page_number is present only for paginated formats.
    let mut metadata = serde_json::Map::new();
    metadata.insert("file_path".into(), meta.file_path.clone().into());
    metadata.insert("chunk_index".into(), meta.chunk_index.to_string().into());
    metadata.insert("total_chunks".into(), meta.total_chunks.to_string().into());
    if let Some(page) = meta.page_number {
        metadata.insert("page_number".into(), page.to_string().into());
    }
    let metadata = serde_json::Value::Object(metadata);
    CChunkData {
        values,
        len,
        text: into_c_string(chunk.chunk.text),
        metadata_json: into_c_string(metadata.to_string()),
    }
}

pub(crate) fn chunk_batch_into_c(chunks: Vec<ChunkEmbedding>) -> CChunkBatch {
    let items: Vec<CChunkData> = chunks.into_iter().map(chunk_into_c).collect();
    let count = items.len();
    let boxed = items.into_boxed_slice();
    CChunkBatch {
        items: Box::into_raw(boxed) as *mut CChunkData,
        count,
    }
}

unsafe fn free_embedding_fields(embedding: &mut CTextEmbedding) {
    if !embedding.values.is_null() {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                embedding.values,
                embedding.len,
            )));
        }
        embedding.values = std::ptr::null_mut();
    }
}

unsafe fn free_chunk_fields(chunk: &mut CChunkData) {
    if !chunk.values.is_null() {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                chunk.values,
                chunk.len,
            )));
        }
        chunk.values = std::ptr::null_mut();
    }
    if !chunk.text.is_null() {
        unsafe { drop(CString::from_raw(chunk.text)) };
        chunk.text = std::ptr::null_mut();
    }
    if !chunk.metadata_json.is_null() {
        unsafe { drop(CString::from_raw(chunk.metadata_json)) };
        chunk.metadata_json = std::ptr::null_mut();
    }
}

/// Release an embedding returned by `embed_text` or an async poll.
///
/// # Safety
///
/// `ptr` must be NULL or an embedding pointer produced by this library, not
/// yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_embedding(ptr: *mut CTextEmbedding) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let mut boxed = Box::from_raw(ptr);
        free_embedding_fields(&mut boxed);
    }
}

/// Release a batch returned by `embed_texts_batch` or an async poll.
///
/// # Safety
///
/// `ptr` must be NULL or a batch pointer produced by this library, not yet
/// freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_embedding_batch(ptr: *mut CTextEmbeddingBatch) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let boxed = Box::from_raw(ptr);
        if !boxed.items.is_null() {
            let mut items = Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                boxed.items,
                boxed.count,
            ));
            for item in items.iter_mut() {
                free_embedding_fields(item);
            }
        }
    }
}

/// Release a single chunk record detached from its batch.
///
/// Only for chunk pointers handed out individually; chunks inside a batch
/// are released by `free_chunk_batch`.
///
/// # Safety
///
/// `ptr` must be NULL or a chunk pointer produced by this library, not yet
/// freed and not part of a batch that will also be freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_chunk_data(ptr: *mut CChunkData) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let mut boxed = Box::from_raw(ptr);
        free_chunk_fields(&mut boxed);
    }
}

/// Release a chunk batch returned by `embed_file`, an async poll, or a
/// streaming callback (callbacks own the batches they receive).
///
/// # Safety
///
/// `ptr` must be NULL or a chunk batch pointer produced by this library, not
/// yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_chunk_batch(ptr: *mut CChunkBatch) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let batch = Box::from_raw(ptr);
        if !batch.items.is_null() {
            let mut items = Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                batch.items,
                batch.count,
            ));
            for item in items.iter_mut() {
                free_chunk_fields(item);
            }
        }
    }
}
