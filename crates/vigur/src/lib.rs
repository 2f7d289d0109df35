//! Vigur - text embedding engine with file and directory chunking.
//!
//! Vigur turns text, files, and whole directories into dense embedding
//! vectors. Models are resolved through a curated registry; the bundled
//! encoder is a deterministic hashed random-projection backend, so the same
//! input always produces the same vector and no downloads are required.
//!
//! The public API is async to match backends that do real I/O:
//!
//! ```no_run
//! # async fn demo() -> vigur::VigurResult<()> {
//! let embedder = vigur::Embedder::builder("minilm-l6-v2").build().await?;
//! let result = embedder.embed("hello world").await?;
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod device;
pub mod embedder;
mod encoder;
mod error;
pub mod registry;

pub use chunk::{Chunk, ChunkConfig, ChunkMetadata, SUPPORTED_EXTENSIONS, WalkStats};
pub use device::ComputeDevice;
pub use embedder::{
    ChunkEmbedding, Dtype, Embedder, EmbedderBuilder, EmbeddingResult, cosine_similarity,
};
pub use error::{VigurError, VigurResult};
pub use registry::{ModelArchitecture, ModelInfo, ModelType};

/// Environment variable holding an optional credential for remote model
/// sources. Treated as opaque and never logged.
pub const TOKEN_ENV_VAR: &str = "VIGUR_TOKEN";
