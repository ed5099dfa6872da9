//! LLM provider factory.
//!
//! Resolves a configured provider name to a concrete client, applying the
//! endpoint, API key and request timeout from the settings.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use dashlens_core::{AppError, AppResult, ProviderSettings};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client from provider settings.
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - The provider requires an API key and none was supplied
/// - The HTTP client cannot be built
pub fn create_client(
    settings: &ProviderSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!(
            "Unknown provider: {}. Supported: ollama, openai",
            settings.provider
        ))
    })?;

    let endpoint = settings
        .endpoint
        .as_deref()
        .unwrap_or_else(|| provider.default_endpoint());
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));

    tracing::debug!(
        provider = provider.as_str(),
        endpoint,
        model = %settings.model,
        "Creating LLM client"
    );

    match provider {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_timeout(endpoint, timeout)?)),
        ProviderType::OpenAI => {
            let key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                AppError::Config("OpenAI provider requires API key".to_string())
            })?;
            Ok(Arc::new(OpenAiClient::new(endpoint, key, timeout)?))
        }
    }
}
