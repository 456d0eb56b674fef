//! LLM client — unified interface for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use reverie_core::config::LlmConfig;
use reverie_core::language::{BoxFuture, GenerationOptions, LanguageModel};

use crate::error::LlmError;

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API (also works with Anthropic, Together, etc.).
    OpenAiCompatible {
        /// Base URL of the API.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available — all calls error, triggering the heuristic path.
    None,
}

/// A response from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated, when the backend reports it.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// The LLM client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    timeout_ms: u64,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        max_retries: u32,
        timeout_ms: u64,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            timeout_ms,
        }
    }

    /// Create a client with no backend (all calls fail → heuristic path).
    #[must_use]
    pub fn none() -> Self {
        Self {
            provider: LlmProvider::None,
            http: Client::new(),
            model: String::new(),
            max_retries: 0,
            timeout_ms: 0,
        }
    }

    /// Build a client from the core LLM configuration. An unrecognized
    /// provider string degrades to the `None` backend with a warning.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let provider = match config.provider.to_ascii_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: config.base_url.clone(),
            },
            "openai" => LlmProvider::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key: std::env::var("REVERIE_LLM_API_KEY").unwrap_or_default(),
            },
            "none" => LlmProvider::None,
            other => {
                warn!(provider = other, "unknown LLM provider, running without a model");
                LlmProvider::None
            }
        };
        Self::new(
            provider,
            config.model.clone(),
            config.max_retries,
            config.request_timeout_ms,
        )
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a completion.
    ///
    /// # Errors
    /// Returns an error if the backend is unavailable or all retries
    /// fail; callers fall back to their heuristic path.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable(
                "no LLM provider configured".to_string(),
            )),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, prompt, options).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, prompt, options).await
            }
        }
    }

    async fn generate_ollama(
        &self,
        base_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/api/generate");
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            }
        });
        if let Some(stop) = &options.stop {
            body["options"]["stop"] = json!(stop);
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("retrying Ollama call (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .json(&body)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: serde_json::Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let text = parsed["response"].as_str().unwrap_or("").to_string();
                    return Ok(LlmResponse {
                        text,
                        tokens_generated: parsed["eval_count"].as_u64().unwrap_or(0) as u32,
                        latency_ms,
                    });
                }
                Ok(resp) => {
                    last_error = format!(
                        "HTTP {}: {}",
                        resp.status(),
                        resp.text().await.unwrap_or_default()
                    );
                    warn!("Ollama returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!("Ollama request timed out after {}ms", self.timeout_ms);
                    } else {
                        warn!("Ollama request failed: {last_error}");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/v1/chat/completions");
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(stop) = &options.stop {
            body["stop"] = json!(stop);
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("retrying OpenAI call (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: serde_json::Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let text = parsed["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or("")
                        .to_string();
                    let tokens =
                        parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;
                    return Ok(LlmResponse {
                        text,
                        tokens_generated: tokens,
                        latency_ms,
                    });
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!("OpenAI API returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("OpenAI API request failed: {last_error}");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

impl LanguageModel for LlmClient {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, reverie_core::error::Result<String>> {
        Box::pin(async move {
            let response = self.generate(prompt, options).await?;
            Ok(response.text)
        })
    }

    fn is_available(&self) -> bool {
        self.is_configured()
    }
}
