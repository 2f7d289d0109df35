//! Error types shared across the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the Vigur engine.
#[derive(Debug, Error)]
pub enum VigurError {
    /// Model identifier not present in the registry.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Caller-supplied parameter failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input path does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File extension outside the supported set.
    #[error("unsupported format: .{0}")]
    UnsupportedFormat(String),

    /// File exists but could not be read or parsed.
    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A multi-vector model was used where one vector per input is required.
    #[error("model '{0}' produces multi-vector output")]
    MultiVector(String),

    /// The encoder itself failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[from] anyhow::Error),
}

/// Result type for engine operations.
pub type VigurResult<T> = Result<T, VigurError>;
