//! Embedder construction.

use super::{Dtype, Embedder};
use crate::error::{VigurError, VigurResult};
use crate::registry::ModelType;
use crate::TOKEN_ENV_VAR;

/// Builder for [`Embedder`].
///
/// ```no_run
/// # use vigur::EmbedderBuilder;
/// # async fn run() -> vigur::VigurResult<()> {
/// let embedder = EmbedderBuilder::new("minilm-l6-v2")
///     .revision("main")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct EmbedderBuilder {
    model_id: String,
    revision: String,
    dtype: Dtype,
    token: Option<String>,
}

impl EmbedderBuilder {
    /// Start building an embedder for the given model, addressed by CLI slug
    /// or repository id.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: "main".to_string(),
            dtype: Dtype::default(),
            token: None,
        }
    }

    /// Pin a model revision. Defaults to `main`.
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Numeric precision of returned embeddings. Defaults to F32.
    pub fn dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    /// Access token for gated models. When unset, the `VIGUR_TOKEN`
    /// environment variable is consulted.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Resolve the model and construct the embedder.
    pub async fn build(self) -> VigurResult<Embedder> {
        let model = ModelType::from_name(&self.model_id)
            .ok_or_else(|| VigurError::UnknownModel(self.model_id.clone()))?;
        // Bundled models need no authentication; the token is accepted so
        // callers can set it once regardless of which model they load.
        let _token = self
            .token
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok());
        Embedder::from_parts(model, self.revision, self.dtype)
    }
}
