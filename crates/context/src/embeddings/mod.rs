//! Embedding generation for dashboard contexts.
//!
//! Providers are reached through [`EmbeddingProvider`]; [`Embedder`] adds the
//! per-call timeout and unit-length normalization every index vector needs.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};

use dashlens_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Provider handle that produces unit-length vectors under a timeout.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Identity of the vectors this embedder produces.
    pub fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
            dimensions: self.provider.dimensions(),
        }
    }

    /// Embed `text` and normalize the result to unit length.
    ///
    /// Fails on blank input, provider errors, timeouts, a wrong dimension or
    /// a zero vector.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        let raw = tokio::time::timeout(self.timeout, self.provider.embed(text))
            .await
            .map_err(|_| AppError::timeout("embedding request", self.timeout.as_secs()))??;

        if raw.len() != self.dimensions() {
            return Err(AppError::Embedding(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                raw.len(),
                self.dimensions()
            )));
        }

        normalize(raw)
    }
}

/// Scale `vector` to unit length.
pub fn normalize(mut vector: Vec<f32>) -> AppResult<Vec<f32>> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(AppError::Embedding(
            "Embedding has zero or non-finite norm".to_string(),
        ));
    }
    for v in &mut vector {
        *v /= norm;
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::mock::MockProvider;

    fn embedder() -> Embedder {
        Embedder::new(Arc::new(MockProvider::new(64)), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_embed_is_unit_length() {
        let vector = embedder().embed("quarterly revenue").await.unwrap();
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        assert!(embedder().embed("  \n").await.is_err());
    }

    #[tokio::test]
    async fn test_zero_vector_rejected() {
        // Only stop words: the mock provider yields all zeros
        assert!(embedder().embed("the of and").await.is_err());
    }

    #[test]
    fn test_normalize() {
        let v = normalize(vec![3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(normalize(vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn test_config_reflects_provider() {
        let config = embedder().config();
        assert_eq!(config.provider, "mock");
        assert_eq!(config.dimensions, 64);
    }
}
