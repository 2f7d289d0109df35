//! The embedder itself.

use std::path::Path;

use super::{ChunkEmbedding, Dtype, EmbeddingResult};
use crate::chunk::{self, ChunkConfig, WalkStats};
use crate::encoder::SentenceEncoder;
use crate::error::{VigurError, VigurResult};
use crate::registry::{ModelArchitecture, ModelType};

/// A loaded embedding model.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct Embedder {
    model_type: ModelType,
    revision: String,
    dtype: Dtype,
    encoder: SentenceEncoder,
}

impl Embedder {
    /// Start building an embedder for the given model.
    pub fn builder(model_id: impl Into<String>) -> super::EmbedderBuilder {
        super::EmbedderBuilder::new(model_id)
    }

    pub(crate) fn from_parts(
        model_type: ModelType,
        revision: String,
        dtype: Dtype,
    ) -> VigurResult<Embedder> {
        if revision.is_empty() {
            return Err(VigurError::InvalidConfig(
                "revision must not be empty".into(),
            ));
        }
        let encoder = SentenceEncoder::new(model_type, &revision, dtype);
        log::info!(
            "loaded model {} (revision {revision}, dim {})",
            model_type.cli_name(),
            encoder.dimension()
        );
        Ok(Embedder {
            model_type,
            revision,
            dtype,
            encoder,
        })
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Output dimension per vector.
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> VigurResult<EmbeddingResult> {
        Ok(self.encoder.encode(text))
    }

    /// Embed a batch of texts. Results are in input order and identical to
    /// embedding each text on its own.
    pub async fn embed_batch(&self, texts: &[String]) -> VigurResult<Vec<EmbeddingResult>> {
        Ok(self.encoder.encode_batch(texts))
    }

    /// Chunk a file and embed every chunk.
    ///
    /// Late-interaction models cannot produce the single vector per chunk
    /// this operation requires.
    pub async fn embed_file(
        &self,
        path: &Path,
        config: &ChunkConfig,
    ) -> VigurResult<Vec<ChunkEmbedding>> {
        self.require_dense()?;
        let chunks = chunk::chunk_file(path, config)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        // Encode batch_size chunks at a time to bound peak memory.
        let mut results = Vec::with_capacity(texts.len());
        for block in texts.chunks(config.batch_size.max(1)) {
            results.extend(self.encoder.encode_batch(block));
        }
        let mut out = Vec::with_capacity(chunks.len());
        for (chunk, result) in chunks.into_iter().zip(results) {
            let EmbeddingResult::Dense(embedding) = result else {
                return Err(VigurError::EmbeddingFailed(anyhow::anyhow!(
                    "dense model produced non-dense output"
                )));
            };
            out.push(ChunkEmbedding { chunk, embedding });
        }
        Ok(out)
    }

    /// Embed every supported file under a directory, streaming results to
    /// `sink` one batch per file.
    ///
    /// `extensions` narrows the walk to a subset of the supported formats
    /// (compared case-insensitively, without dots); `None` means all of them.
    /// Files that fail to chunk are logged and skipped; the walk continues.
    /// `sink` returning `false` cancels the walk after the current file.
    pub async fn embed_directory_stream<F>(
        &self,
        dir: &Path,
        config: &ChunkConfig,
        extensions: Option<&[String]>,
        mut sink: F,
    ) -> VigurResult<WalkStats>
    where
        F: FnMut(Vec<ChunkEmbedding>) -> bool,
    {
        self.require_dense()?;
        config.validate()?;
        let mut files = chunk::walk_files(dir)?;
        if let Some(allowed) = extensions.filter(|e| !e.is_empty()) {
            files.retain(|path| {
                chunk::extension_of(path)
                    .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
                    .unwrap_or(false)
            });
        }
        let mut stats = WalkStats::default();
        for path in files {
            let embeddings = match self.embed_file(&path, config).await {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("skipping {}: {e}", path.display());
                    stats.files_skipped += 1;
                    continue;
                }
            };
            stats.files_processed += 1;
            if embeddings.is_empty() {
                continue;
            }
            if !sink(embeddings) {
                log::info!("directory embedding cancelled by consumer");
                break;
            }
        }
        Ok(stats)
    }

    fn require_dense(&self) -> VigurResult<()> {
        if self.model_type.architecture() == ModelArchitecture::LateInteraction {
            return Err(VigurError::MultiVector(
                self.model_type.cli_name().to_string(),
            ));
        }
        Ok(())
    }
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
