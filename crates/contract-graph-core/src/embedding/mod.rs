//! Embedding providers
//!
//! An embedding provider turns description text into a vector for similarity
//! search. It is optional: the engine polls [`EmbeddingProvider::readiness`]
//! and treats "not ready" as a normal state. Applies then store modules
//! without embeddings and only filter-only searches are available.
//!
//! Vectors handed out by providers are L2-normalised, so similarity is a
//! plain dot product.

pub mod http;

pub use http::HttpEmbeddingProvider;

use async_trait::async_trait;
use thiserror::Error;

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Empty or whitespace-only input text
    #[error("Cannot embed empty text")]
    EmptyText,

    /// Provider has not finished initialising, or is disabled
    #[error("Embedding provider is not ready")]
    NotReady,

    /// Transport failure talking to the embedding service
    #[error("Embedding service error: {0}")]
    Http(String),

    /// Service answered with something that is not a usable vector
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;

/// Tri-state capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Embeddings can be generated
    Ready,
    /// Still initialising, or intentionally disabled
    NotReady,
    /// Initialisation failed; the message says why
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Text-to-vector provider
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Current readiness; a pure query with no side effects
    fn readiness(&self) -> Readiness;

    fn is_ready(&self) -> bool {
        self.readiness().is_ready()
    }

    /// Embed non-empty text into a normalised vector
    async fn generate_embedding(&self, text: &str) -> EmbeddingResult<Vec<f32>>;
}

/// Provider used when no embedding service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    fn name(&self) -> &str {
        "disabled"
    }

    fn readiness(&self) -> Readiness {
        Readiness::NotReady
    }

    async fn generate_embedding(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
        Err(EmbeddingError::NotReady)
    }
}

/// Scale a vector to unit length
pub fn normalize(mut vector: Vec<f32>) -> EmbeddingResult<Vec<f32>> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidResponse("empty vector".to_string()));
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return Err(EmbeddingError::InvalidResponse(
            "vector has no usable magnitude".to_string(),
        ));
    }
    for value in &mut vector {
        *value /= norm;
    }
    Ok(vector)
}

/// Dot product of two equally sized vectors; `None` when the sizes differ
pub fn dot(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}
