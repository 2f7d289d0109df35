//! Curated model registry.
//!
//! Models are addressed either by their CLI-friendly slug (`minilm-l6-v2`)
//! or by their upstream repository id. The registry is the single source of
//! truth for output dimension and representation shape.

/// Representation shape a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelArchitecture {
    /// One fixed-length vector per input.
    Dense,
    /// One vector per token (late-interaction models such as ColBERT).
    LateInteraction,
}

impl ModelArchitecture {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Dense => "Dense encoder",
            Self::LateInteraction => "Late-interaction encoder",
        }
    }
}

/// The curated list of models supported by Vigur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    MiniLmL6V2,
    MpnetBaseV2,
    BgeSmallEnV15,
    ColbertV2,
}

/// Complete metadata for a registry entry.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Representation shape.
    pub architecture: ModelArchitecture,
    /// Output dimension (per vector).
    pub dimension: usize,
    /// Maximum input length in tokens.
    pub max_seq_len: usize,
    /// Human-readable description.
    pub description: &'static str,
}

impl ModelType {
    /// All registry entries.
    pub fn all() -> &'static [ModelType] {
        &[
            Self::MiniLmL6V2,
            Self::MpnetBaseV2,
            Self::BgeSmallEnV15,
            Self::ColbertV2,
        ]
    }

    /// Get the CLI-friendly slug (e.g. "minilm-l6-v2").
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::MiniLmL6V2 => "minilm-l6-v2",
            Self::MpnetBaseV2 => "mpnet-base-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::ColbertV2 => "colbert-v2",
        }
    }

    /// Upstream repository id.
    pub fn repo_id(&self) -> &'static str {
        match self {
            Self::MiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::MpnetBaseV2 => "sentence-transformers/all-mpnet-base-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::ColbertV2 => "colbert-ir/colbertv2.0",
        }
    }

    /// Resolve a model by CLI slug or repository id.
    pub fn from_name(name: &str) -> Option<ModelType> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.cli_name() == name || m.repo_id() == name)
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            Self::MiniLmL6V2 => ModelInfo {
                architecture: ModelArchitecture::Dense,
                dimension: 384,
                max_seq_len: 256,
                description: "Fast general-purpose sentence encoder",
            },
            Self::MpnetBaseV2 => ModelInfo {
                architecture: ModelArchitecture::Dense,
                dimension: 768,
                max_seq_len: 384,
                description: "Higher-quality sentence encoder",
            },
            Self::BgeSmallEnV15 => ModelInfo {
                architecture: ModelArchitecture::Dense,
                dimension: 384,
                max_seq_len: 512,
                description: "English retrieval encoder",
            },
            Self::ColbertV2 => ModelInfo {
                architecture: ModelArchitecture::LateInteraction,
                dimension: 128,
                max_seq_len: 512,
                description: "Late-interaction retrieval model (one vector per token)",
            },
        }
    }

    pub fn architecture(&self) -> ModelArchitecture {
        self.info().architecture
    }

    pub fn dimension(&self) -> usize {
        self.info().dimension
    }
}
