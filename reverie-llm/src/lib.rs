//! # Reverie LLM
//!
//! HTTP-backed capability providers for the reverie cognitive core:
//! a [`client::LlmClient`] speaking Ollama and OpenAI-compatible APIs,
//! and an [`embedding::OllamaEmbedder`] for retrieval relevance. Both
//! implement the injection contracts from `reverie-core`; the core never
//! depends on a concrete provider.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod embedding;
pub mod error;

pub use client::{LlmClient, LlmProvider, LlmResponse};
pub use embedding::OllamaEmbedder;
pub use error::LlmError;

use std::sync::Arc;

use reverie_core::config::LlmConfig;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::language::LanguageModel;

/// Build the (language model, embedding provider) pair from configuration.
///
/// A `"none"` provider yields an always-unavailable model and no
/// embedder, which puts the whole cognitive core on its deterministic
/// heuristic paths.
#[must_use]
pub fn capabilities_from_config(
    config: &LlmConfig,
) -> (Arc<dyn LanguageModel>, Option<Arc<dyn EmbeddingProvider>>) {
    let client = LlmClient::from_config(config);
    if !client.is_configured() {
        return (Arc::new(client), None);
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::from_config(config));
    (Arc::new(client), Some(embedder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_config_disables_both_capabilities() {
        let config = LlmConfig {
            provider: "none".to_string(),
            ..LlmConfig::default()
        };
        let (model, embedder) = capabilities_from_config(&config);
        assert!(!model.is_available());
        assert!(embedder.is_none());
    }

    #[test]
    fn ollama_config_enables_both_capabilities() {
        let config = LlmConfig::default();
        let (model, embedder) = capabilities_from_config(&config);
        assert!(model.is_available());
        assert!(embedder.is_some());
    }
}
