//! Deterministic sentence encoder.
//!
//! Texts are tokenized on whitespace, each token is hashed and expanded into
//! a pseudo-random projection vector, and the token vectors are mean-pooled
//! and L2-normalized. The same text always produces the same embedding for a
//! given model and revision, across processes and platforms.

use rayon::prelude::*;

use crate::embedder::{Dtype, EmbeddingResult};
use crate::registry::{ModelArchitecture, ModelType};

/// Per-token vector cap for late-interaction output.
const MAX_TOKEN_VECTORS: usize = 512;

#[derive(Debug)]
pub(crate) struct SentenceEncoder {
    seed: u64,
    dimension: usize,
    architecture: ModelArchitecture,
    dtype: Dtype,
}

impl SentenceEncoder {
    pub fn new(model: ModelType, revision: &str, dtype: Dtype) -> Self {
        let info = model.info();
        let mut seed = fnv1a(model.repo_id().as_bytes());
        seed = fnv1a_with(seed, revision.as_bytes());
        Self {
            seed,
            dimension: info.dimension,
            architecture: info.architecture,
            dtype,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encode a single text. Dense models return one vector, late-interaction
    /// models one vector per token.
    pub fn encode(&self, text: &str) -> EmbeddingResult {
        match self.architecture {
            ModelArchitecture::Dense => EmbeddingResult::Dense(self.encode_dense(text)),
            ModelArchitecture::LateInteraction => {
                EmbeddingResult::Multi(self.encode_multi(text))
            }
        }
    }

    /// Encode a batch. Each item goes through the same path as [`encode`],
    /// so batch results are identical to per-item results.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<EmbeddingResult> {
        texts.par_iter().map(|t| self.encode(t)).collect()
    }

    fn encode_dense(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimension];
        let mut count = 0usize;
        for token in text.split_whitespace() {
            self.add_token(&mut acc, token);
            count += 1;
        }
        if count == 0 {
            // Empty and whitespace-only inputs still embed to a valid vector.
            self.add_token(&mut acc, text);
            count = 1;
        }
        let inv = 1.0 / count as f32;
        for v in acc.iter_mut() {
            *v *= inv;
        }
        l2_normalize(&mut acc);
        self.quantize(&mut acc);
        acc
    }

    fn encode_multi(&self, text: &str) -> Vec<Vec<f32>> {
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        for token in text.split_whitespace().take(MAX_TOKEN_VECTORS) {
            let mut v = vec![0.0f32; self.dimension];
            self.add_token(&mut v, token);
            l2_normalize(&mut v);
            self.quantize(&mut v);
            vectors.push(v);
        }
        if vectors.is_empty() {
            let mut v = vec![0.0f32; self.dimension];
            self.add_token(&mut v, text);
            l2_normalize(&mut v);
            self.quantize(&mut v);
            vectors.push(v);
        }
        vectors
    }

    fn add_token(&self, acc: &mut [f32], token: &str) {
        let mut state = fnv1a_with(self.seed, token.as_bytes());
        for v in acc.iter_mut() {
            state = splitmix64(state);
            // Map the top 24 bits onto [-1, 1).
            let unit = (state >> 40) as f32 / (1u64 << 23) as f32 - 1.0;
            *v += unit;
        }
    }

    fn quantize(&self, values: &mut [f32]) {
        if self.dtype == Dtype::F16 {
            for v in values.iter_mut() {
                // Half-precision mantissa truncation.
                *v = f32::from_bits(v.to_bits() & 0xFFFF_E000);
            }
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    fnv1a_with(0xcbf2_9ce4_8422_2325, bytes)
}

fn fnv1a_with(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> SentenceEncoder {
        SentenceEncoder::new(ModelType::MiniLmL6V2, "main", Dtype::F32)
    }

    #[test]
    fn output_has_model_dimension() {
        let enc = encoder();
        match enc.encode("hello world") {
            EmbeddingResult::Dense(v) => assert_eq!(v.len(), 384),
            EmbeddingResult::Multi(_) => panic!("dense model produced multi-vector output"),
        }
    }

    #[test]
    fn same_text_same_embedding() {
        let enc = encoder();
        let a = enc.encode("the quick brown fox");
        let b = enc.encode("the quick brown fox");
        match (a, b) {
            (EmbeddingResult::Dense(a), EmbeddingResult::Dense(b)) => assert_eq!(a, b),
            _ => panic!("unexpected shape"),
        }
    }

    #[test]
    fn different_texts_differ() {
        let enc = encoder();
        let a = enc.encode("first sentence");
        let b = enc.encode("second sentence");
        match (a, b) {
            (EmbeddingResult::Dense(a), EmbeddingResult::Dense(b)) => assert_ne!(a, b),
            _ => panic!("unexpected shape"),
        }
    }

    #[test]
    fn output_is_unit_norm() {
        let enc = encoder();
        let EmbeddingResult::Dense(v) = enc.encode("normalize me") else {
            panic!("unexpected shape");
        };
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn empty_text_embeds() {
        let enc = encoder();
        let EmbeddingResult::Dense(v) = enc.encode("") else {
            panic!("unexpected shape");
        };
        assert_eq!(v.len(), 384);
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn batch_matches_single() {
        let enc = encoder();
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let batch = enc.encode_batch(&texts);
        for (text, result) in texts.iter().zip(batch) {
            assert_eq!(result, enc.encode(text));
        }
    }

    #[test]
    fn late_interaction_one_vector_per_token() {
        let enc = SentenceEncoder::new(ModelType::ColbertV2, "main", Dtype::F32);
        let EmbeddingResult::Multi(vectors) = enc.encode("three token input") else {
            panic!("late-interaction model produced dense output");
        };
        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            assert_eq!(v.len(), 128);
        }
    }

    #[test]
    fn f16_truncates_mantissa() {
        let enc = SentenceEncoder::new(ModelType::MiniLmL6V2, "main", Dtype::F16);
        let EmbeddingResult::Dense(v) = enc.encode("quantized") else {
            panic!("unexpected shape");
        };
        for x in &v {
            assert_eq!(x.to_bits() & 0x1FFF, 0);
        }
    }

    #[test]
    fn revision_changes_embedding() {
        let main = SentenceEncoder::new(ModelType::MiniLmL6V2, "main", Dtype::F32);
        let pinned = SentenceEncoder::new(ModelType::MiniLmL6V2, "v1.0", Dtype::F32);
        assert_ne!(main.encode("same text"), pinned.encode("same text"));
    }
}
