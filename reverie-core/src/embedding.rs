//! Vector embedding capability boundary.
//!
//! Retrieval degrades to recency + importance scoring when no provider is
//! configured or a call fails, so embedding trouble never crashes a query.

use crate::error::Result;
use crate::language::BoxFuture;
use crate::types::Embedding;

/// Generate vector embeddings from text.
///
/// Embedding calls are suspension points: the issuing character awaits the
/// result, the rest of the host keeps running.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Embedding>>;

    /// Embed a batch of texts. The default implementation loops over
    /// [`EmbeddingProvider::embed`]; batch-native providers should override.
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Embedding>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        })
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Stub provider (tests & embedding-free profiles)
// ---------------------------------------------------------------------------

/// A stub provider that returns zero-vectors.
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    /// Create a new stub provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Embedding>> {
        Box::pin(async move { Ok(Embedding(vec![0.0; self.dims])) })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// Deterministic hash provider (integration tests)
// ---------------------------------------------------------------------------

/// A deterministic provider that hashes words into bucket counts and
/// L2-normalizes the result. Texts sharing vocabulary land near each other,
/// which is enough signal for relevance-ranking tests without a model.
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    /// Create a new hash provider.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        use std::hash::{DefaultHasher, Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        (hasher.finish() as usize) % self.dims
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Embedding>> {
        Box::pin(async move {
            let mut raw = vec![0.0_f32; self.dims];
            for word in text.split_whitespace() {
                let normalized = word.to_ascii_lowercase();
                let trimmed = normalized.trim_matches(|c: char| !c.is_alphanumeric());
                if !trimmed.is_empty() {
                    raw[self.bucket(trimmed)] += 1.0;
                }
            }
            let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            if mag >= f32::EPSILON {
                for x in &mut raw {
                    *x /= mag;
                }
            }
            Ok(Embedding(raw))
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
