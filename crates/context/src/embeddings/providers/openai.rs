//! OpenAI-compatible `/embeddings` provider.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use dashlens_core::{AppError, AppResult, EmbeddingSettings};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(settings: &EmbeddingSettings, api_key: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    /// Order vectors by their `index` and check their shape.
    fn collect_vectors(
        &self,
        mut data: Vec<EmbeddingData>,
        expected: usize,
    ) -> AppResult<Vec<Vec<f32>>> {
        if data.len() != expected {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }

        data.sort_by_key(|d| d.index);
        data.into_iter()
            .map(|d| {
                if d.embedding.len() == self.dimensions {
                    Ok(d.embedding)
                } else {
                    Err(AppError::Embedding(format!(
                        "Unexpected embedding dimensions: got {}, expected {}",
                        d.embedding.len(),
                        self.dimensions
                    )))
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                AppError::Embedding(format!("Failed to send embedding request: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        self.collect_vectors(body.data, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        let settings = EmbeddingSettings {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 3,
            ..EmbeddingSettings::default()
        };
        OpenAiProvider::new(&settings, "sk-test").unwrap()
    }

    #[test]
    fn test_collect_vectors_orders_by_index() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![0.0, 1.0, 0.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0, 0.0, 0.0],
            },
        ];
        let vectors = provider().collect_vectors(data, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_collect_vectors_checks_dimensions() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![1.0, 0.0],
        }];
        assert!(provider().collect_vectors(data, 1).is_err());
    }

    #[test]
    fn test_collect_vectors_checks_count() {
        assert!(provider().collect_vectors(Vec::new(), 1).is_err());
    }

    #[tokio::test]
    async fn test_blank_input_rejected() {
        let result = provider().embed_batch(&[" ".to_string()]).await;
        assert!(result.is_err());
    }
}
