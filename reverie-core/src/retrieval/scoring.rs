//! Per-factor scoring functions for memory retrieval.
//!
//! Score = α·Recency(m) + β·Importance(m) + γ·Relevance(m)
//!
//! Where:
//!   Recency(m)    = decay_factor^(hours since last access), clamped to [0, 1]
//!   Importance(m) = importance / 10
//!   Relevance(m)  = (cosine_similarity(query, memory) + 1) / 2

use crate::memory::MemoryRecord;
use crate::types::{Embedding, SimTimestamp};

/// Recency score: exponential decay on hours since last access.
#[must_use]
pub fn recency_score(record: &MemoryRecord, now: &SimTimestamp, decay_factor: f32) -> f32 {
    let hours = now.hours_since(&record.last_accessed);
    decay_factor.powf(hours).clamp(0.0, 1.0)
}

/// Importance score: the 1-10 scale normalized to [0.1, 1.0].
#[must_use]
pub fn importance_score(record: &MemoryRecord) -> f32 {
    f32::from(record.importance) / 10.0
}

/// Relevance score: cosine similarity remapped from [-1, 1] to [0, 1].
///
/// Returns `None` when the record has no cached embedding, which makes the
/// caller drop the relevance term instead of scoring it as neutral.
#[must_use]
pub fn relevance_score(record: &MemoryRecord, query: &Embedding) -> Option<f32> {
    record
        .embedding
        .as_ref()
        .map(|emb| (query.cosine_similarity(emb) + 1.0) / 2.0)
}
