//! Language-model capability boundary.
//!
//! Planning, reflection, and decision-making all consume the same injected
//! [`LanguageModel`] contract and never a concrete provider. Every call site
//! pairs the model with a deterministic fallback through
//! [`generate_or_fallback`], so an absent or failing model degrades the
//! character's behavior instead of breaking it.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::error::{CognitionError, Result};

/// Boxed future used to keep the capability traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options for a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Optional stop sequences.
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 256,
            stop: None,
        }
    }
}

impl GenerationOptions {
    /// Options tuned for short structured responses.
    #[must_use]
    pub fn structured(max_tokens: u32) -> Self {
        Self {
            temperature: 0.3,
            max_tokens,
            stop: None,
        }
    }
}

/// The external text-generation capability.
///
/// Implementations must apply their own request timeout; a call that never
/// resolves stalls the issuing character's next step.
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String>>;

    /// Whether a backend is configured at all. `false` short-circuits to
    /// the heuristic path without issuing a call.
    fn is_available(&self) -> bool;
}

/// Always-unavailable model. All call sites fall back to heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLanguageModel;

impl LanguageModel for NullLanguageModel {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async {
            Err(CognitionError::Unavailable(
                "no language model configured".to_string(),
            ))
        })
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Which path produced a generated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPath {
    /// The language model produced a parseable response.
    Model,
    /// The deterministic fallback produced the value.
    Heuristic,
}

/// Run the model, parse its output, and fall back deterministically.
///
/// The single dual-path adapter shared by planning, reflection, and
/// decision-making: an unavailable capability, a failed call, and a
/// malformed response all take the same exit — `fallback()` — and none of
/// them are surfaced as errors.
pub async fn generate_or_fallback<T, P, F>(
    model: &dyn LanguageModel,
    purpose: &str,
    prompt: String,
    options: GenerationOptions,
    parse: P,
    fallback: F,
) -> (T, GenerationPath)
where
    P: FnOnce(&str) -> Option<T>,
    F: FnOnce() -> T,
{
    if !model.is_available() {
        debug!(purpose, "language model unavailable, using heuristic");
        return (fallback(), GenerationPath::Heuristic);
    }
    match model.generate(&prompt, &options).await {
        Ok(text) => match parse(&text) {
            Some(value) => (value, GenerationPath::Model),
            None => {
                warn!(purpose, "unparsable model output, using heuristic");
                (fallback(), GenerationPath::Heuristic)
            }
        },
        Err(e) => {
            warn!(purpose, error = %e, "language model call failed, using heuristic");
            (fallback(), GenerationPath::Heuristic)
        }
    }
}
