//! Text embedding.
//!
//! [`Embedder`] is the main entry point. Build one with [`EmbedderBuilder`],
//! then embed single texts, batches, files, or whole directories.

mod builder;
mod model;

pub use builder::EmbedderBuilder;
pub use model::{cosine_similarity, Embedder};

/// Numeric precision of embedding values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dtype {
    #[default]
    F32,
    F16,
}

/// Output of embedding one text.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingResult {
    /// One fixed-length vector.
    Dense(Vec<f32>),
    /// One vector per token (late-interaction models).
    Multi(Vec<Vec<f32>>),
}

impl EmbeddingResult {
    /// The dense vector, if this result is dense.
    pub fn as_dense(&self) -> Option<&[f32]> {
        match self {
            Self::Dense(v) => Some(v),
            Self::Multi(_) => None,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

/// A chunk embedding paired with its source metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEmbedding {
    pub chunk: crate::chunk::Chunk,
    pub embedding: Vec<f32>,
}
