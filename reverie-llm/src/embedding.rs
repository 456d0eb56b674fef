//! Ollama-backed embedding provider.
//!
//! Implements the core [`EmbeddingProvider`] contract over Ollama's
//! embeddings API. Any failure surfaces as a capability error, which the
//! retrieval engine degrades around — it never crashes a query.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::warn;

use reverie_core::config::LlmConfig;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::error::CognitionError;
use reverie_core::language::BoxFuture;
use reverie_core::types::Embedding;

/// Embeddings over Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    http: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    timeout_ms: u64,
}

impl OllamaEmbedder {
    /// Create a new embedder.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
            timeout_ms,
        }
    }

    /// Build an embedder from the core LLM configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions,
            config.request_timeout_ms,
        )
    }

    async fn fetch(&self, text: &str) -> Result<Embedding, CognitionError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": text,
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| CognitionError::Capability(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CognitionError::Capability(format!(
                "embedding endpoint returned HTTP {}",
                response.status()
            )));
        }
        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CognitionError::Capability(e.to_string()))?;
        let Some(values) = parsed["embedding"].as_array() else {
            return Err(CognitionError::Capability(
                "embedding response missing vector".to_string(),
            ));
        };
        let vector: Vec<f32> = values
            .iter()
            .filter_map(serde_json::Value::as_f64)
            .map(|v| v as f32)
            .collect();
        if vector.len() != self.dimensions {
            warn!(
                got = vector.len(),
                expected = self.dimensions,
                "embedding dimensionality differs from configuration"
            );
        }
        Ok(Embedding(vector))
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, reverie_core::error::Result<Embedding>> {
        Box::pin(self.fetch(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_carries_model_and_dimensions() {
        let config = LlmConfig::default();
        let embedder = OllamaEmbedder::from_config(&config);
        assert_eq!(embedder.dimensions(), config.embedding_dimensions);
        assert_eq!(embedder.model, config.embedding_model);
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_capability_error() {
        // Port 9 (discard) is never an Ollama server.
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "all-minilm", 384, 200);
        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(CognitionError::Capability(_))));
    }
}
