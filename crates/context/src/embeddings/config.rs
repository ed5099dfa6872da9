//! Embedding identity recorded alongside a persisted index.

use dashlens_core::{AppError, AppResult, EmbeddingSettings};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider, model and dimension that produced an index's vectors.
///
/// Vectors from different identities are not comparable, so a persisted index
/// is only reused when its identity matches the configured provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from(&EmbeddingSettings::default())
    }
}

impl From<&EmbeddingSettings> for EmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        }
    }
}

impl fmt::Display for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

impl EmbeddingConfig {
    /// Fail unless vectors recorded under `persisted` can be searched with
    /// vectors from `self`. The error names every field that differs.
    pub fn ensure_compatible(&self, persisted: &Self) -> AppResult<()> {
        let mut differing = Vec::new();
        if self.provider != persisted.provider {
            differing.push("provider");
        }
        if self.model != persisted.model {
            differing.push("model");
        }
        if self.dimensions != persisted.dimensions {
            differing.push("dimensions");
        }

        if differing.is_empty() {
            return Ok(());
        }

        Err(AppError::Index(format!(
            "Index was built with {} but the configured embedder is {}: {} differ",
            persisted,
            self,
            differing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigram() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
        }
    }

    #[test]
    fn test_default_follows_settings() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.to_string(), "ollama/nomic-embed-text (768 dims)");
    }

    #[test]
    fn test_same_identity_is_compatible() {
        assert!(trigram().ensure_compatible(&trigram()).is_ok());
    }

    #[test]
    fn test_every_difference_is_named() {
        let persisted = EmbeddingConfig {
            model: "trigram-v2".to_string(),
            dimensions: 1024,
            ..trigram()
        };

        let message = trigram().ensure_compatible(&persisted).unwrap_err().to_string();
        assert!(message.contains("model, dimensions differ"));
        assert!(message.contains("mock/trigram-v2 (1024 dims)"));
        assert!(!message.contains("provider,"));
    }
}
