//! Memory retrieval — multi-factor scoring with stress degradation.
//!
//! The retrieval algorithm combines three weighted factors:
//!   Score = α·Recency + β·Importance + γ·Relevance
//!
//! The combined score is multiplied by a stress modifier; under acute
//! stress (< 0.8) uniform noise proportional to the degradation is mixed
//! in, modeling impaired recall. That path is intentionally
//! non-deterministic; at `stress_modifier = 1.0` retrieval is exactly
//! reproducible.

pub mod scoring;

use std::cmp::Reverse;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use rand::Rng;
use tracing::warn;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::{MemoryKind, MemoryRecord, MemoryStream};
use crate::types::{Embedding, GridPos, MemoryId, SimTimestamp};

/// A scored retrieval result.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    /// The retrieved record (with `last_accessed` already refreshed).
    pub record: MemoryRecord,
    /// Final combined score, after the stress modifier and any noise.
    pub score: f32,
    /// Pre-stress weighted factor contributions, for auditing the ranking.
    pub breakdown: ScoreBreakdown,
}

/// Weighted factor contributions behind a combined score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    /// α × recency factor.
    pub recency: f32,
    /// β × importance factor.
    pub importance: f32,
    /// γ × relevance factor (0.0 when relevance was unavailable).
    pub relevance: f32,
}

impl ScoreBreakdown {
    /// The clean combined score before stress degradation.
    #[must_use]
    pub fn combined(&self) -> f32 {
        self.recency + self.importance + self.relevance
    }
}

/// The retrieval engine: scores stream records against a text query.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalEngine {
    /// Create a new engine. Without an embedding provider all scoring
    /// degrades to recency + importance.
    #[must_use]
    pub fn new(config: RetrievalConfig, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { config, embedder }
    }

    /// Retrieve up to `k` memories relevant to `query`, best first.
    ///
    /// Side effect: every returned record's `last_accessed` is refreshed.
    /// Never fails — embedding trouble just drops the relevance factor.
    pub async fn retrieve(
        &self,
        stream: &mut MemoryStream,
        query: &str,
        k: usize,
        stress_modifier: f32,
        now: SimTimestamp,
    ) -> Vec<RetrievedMemory> {
        self.retrieve_where(stream, |_| true, Some(query), k, stress_modifier, now)
            .await
    }

    /// Same scoring, restricted to records of one kind. Without query text
    /// the relevance factor is skipped entirely.
    pub async fn retrieve_by_kind(
        &self,
        stream: &mut MemoryStream,
        kind: MemoryKind,
        query: Option<&str>,
        k: usize,
        stress_modifier: f32,
        now: SimTimestamp,
    ) -> Vec<RetrievedMemory> {
        self.retrieve_where(stream, move |r| r.kind == kind, query, k, stress_modifier, now)
            .await
    }

    /// Same scoring, restricted to records within `radius` of `center`.
    pub async fn retrieve_by_location(
        &self,
        stream: &mut MemoryStream,
        center: GridPos,
        radius: f32,
        query: Option<&str>,
        k: usize,
        stress_modifier: f32,
        now: SimTimestamp,
    ) -> Vec<RetrievedMemory> {
        self.retrieve_where(
            stream,
            move |r| r.location.is_some_and(|loc| loc.distance(&center) <= radius),
            query,
            k,
            stress_modifier,
            now,
        )
        .await
    }

    async fn retrieve_where<F>(
        &self,
        stream: &mut MemoryStream,
        filter: F,
        query: Option<&str>,
        k: usize,
        stress_modifier: f32,
        now: SimTimestamp,
    ) -> Vec<RetrievedMemory>
    where
        F: Fn(&MemoryRecord) -> bool,
    {
        if k == 0 || stream.all().is_empty() {
            return Vec::new();
        }

        let candidates: Vec<MemoryId> = stream
            .all()
            .iter()
            .filter(|r| filter(r))
            .map(|r| r.id)
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let query_embedding = match query.filter(|q| !q.trim().is_empty()) {
            Some(q) => self.embed_query(q).await,
            None => None,
        };
        if query_embedding.is_some() {
            self.fill_missing_embeddings(stream, &candidates).await;
        }

        let weights = &self.config.weights;
        let mut scored: Vec<RetrievedMemory> = Vec::with_capacity(candidates.len());
        for id in &candidates {
            let Some(record) = stream.by_id(*id) else { continue };

            let recency = scoring::recency_score(record, &now, self.config.decay_factor);
            let importance = scoring::importance_score(record);
            let relevance = query_embedding
                .as_ref()
                .and_then(|q| scoring::relevance_score(record, q));

            let breakdown = match relevance {
                Some(rel) => ScoreBreakdown {
                    recency: weights.recency * recency,
                    importance: weights.importance * importance,
                    relevance: weights.relevance * rel,
                },
                // No relevance signal: renormalize over the remaining
                // weights so degraded scores stay on the same scale.
                None => {
                    let denom = (weights.recency + weights.importance).max(f32::EPSILON);
                    ScoreBreakdown {
                        recency: weights.recency * recency / denom,
                        importance: weights.importance * importance / denom,
                        relevance: 0.0,
                    }
                }
            };

            let mut score = breakdown.combined() * stress_modifier;
            if stress_modifier < self.config.stress_noise_threshold {
                let magnitude = (1.0 - stress_modifier) * self.config.stress_noise_scale;
                score += rand::thread_rng().gen_range(-magnitude..=magnitude);
            }

            scored.push(RetrievedMemory {
                record: record.clone(),
                score,
                breakdown,
            });
        }

        // Stable sort: ties keep insertion order.
        scored.sort_by_key(|r| Reverse(OrderedFloat(r.score)));
        scored.truncate(k);

        for result in &mut scored {
            stream.mark_accessed(result.record.id, now);
            result.record.record_access(now);
        }
        scored
    }

    async fn embed_query(&self, query: &str) -> Option<Embedding> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(query).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(error = %e, "query embedding failed, degrading to recency+importance");
                None
            }
        }
    }

    /// Lazily compute and cache embeddings for candidates that lack one.
    async fn fill_missing_embeddings(&self, stream: &mut MemoryStream, candidates: &[MemoryId]) {
        let Some(embedder) = self.embedder.as_ref() else { return };
        let missing: Vec<(MemoryId, String)> = stream
            .needing_embeddings()
            .into_iter()
            .filter(|(id, _)| candidates.contains(id))
            .collect();
        if missing.is_empty() {
            return;
        }
        let texts: Vec<String> = missing.iter().map(|(_, d)| d.clone()).collect();
        match embedder.embed_batch(&texts).await {
            Ok(embeddings) => {
                for ((id, _), embedding) in missing.into_iter().zip(embeddings) {
                    stream.set_embedding(id, embedding);
                }
            }
            Err(e) => warn!(error = %e, "memory embedding failed, scoring without relevance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalWeights;
    use crate::embedding::HashEmbeddingProvider;

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    fn engine_with_hash_embedder() -> RetrievalEngine {
        RetrievalEngine::new(
            RetrievalConfig::default(),
            Some(Arc::new(HashEmbeddingProvider::new(64))),
        )
    }

    #[tokio::test]
    async fn returns_at_most_k_sorted() {
        let mut stream = MemoryStream::with_capacity(50);
        for i in 0..10u64 {
            stream.add_observation(format!("event {i}"), (i % 9 + 1) as u8, vec![], None, ts(i));
        }
        let engine = engine_with_hash_embedder();
        let results = engine.retrieve(&mut stream, "event", 4, 1.0, ts(100)).await;
        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn k_zero_and_empty_stream_yield_nothing() {
        let engine = engine_with_hash_embedder();
        let mut empty = MemoryStream::with_capacity(5);
        assert!(engine.retrieve(&mut empty, "anything", 5, 1.0, ts(0)).await.is_empty());

        empty.add_observation("one", 5, vec![], None, ts(0));
        assert!(engine.retrieve(&mut empty, "anything", 0, 1.0, ts(0)).await.is_empty());
    }

    #[tokio::test]
    async fn unstressed_retrieval_is_deterministic() {
        // Identical text, importance, and timestamps: every factor ties, so
        // ordering falls through to stable insertion order on both calls.
        let mut stream = MemoryStream::with_capacity(50);
        for _ in 0..8u64 {
            stream.add_observation("a long corridor", 5, vec![], None, ts(5));
        }
        let engine = engine_with_hash_embedder();
        let first: Vec<MemoryId> = engine
            .retrieve(&mut stream, "corridor", 5, 1.0, ts(10))
            .await
            .iter()
            .map(|r| r.record.id)
            .collect();
        let second: Vec<MemoryId> = engine
            .retrieve(&mut stream, "corridor", 5, 1.0, ts(10))
            .await
            .iter()
            .map(|r| r.record.id)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn importance_breaks_relevance_ties() {
        // Two memories with embeddings identical to the query (similarity
        // 1.0), equal recency, importances 2 and 9, weights (0.3, 0.3, 0.4):
        // the importance-9 memory must rank strictly higher.
        let config = RetrievalConfig {
            weights: RetrievalWeights {
                recency: 0.3,
                importance: 0.3,
                relevance: 0.4,
            },
            ..RetrievalConfig::default()
        };
        let engine = RetrievalEngine::new(config, Some(Arc::new(HashEmbeddingProvider::new(64))));

        let mut stream = MemoryStream::with_capacity(10);
        let weak = stream.add_observation("the fountain in the east wing", 2, vec![], None, ts(0));
        let strong = stream.add_observation("the fountain in the east wing", 9, vec![], None, ts(0));

        let results = engine
            .retrieve(&mut stream, "the fountain in the east wing", 2, 1.0, ts(0))
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, strong.id);
        assert_eq!(results[1].record.id, weak.id);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn stress_noise_stays_bounded() {
        // Below the 0.8 threshold scoring is intentionally noisy; the noise
        // magnitude is still bounded by (1 - stress) * noise_scale, so each
        // final score stays inside that envelope around the degraded score.
        let config = RetrievalConfig::default();
        let scale = config.stress_noise_scale;
        let engine = RetrievalEngine::new(config, Some(Arc::new(HashEmbeddingProvider::new(64))));

        let mut stream = MemoryStream::with_capacity(20);
        for i in 0..6u64 {
            stream.add_observation(format!("junction {i}"), 5, vec![], None, ts(i));
        }
        let stress = 0.5;
        let results = engine.retrieve(&mut stream, "junction", 6, stress, ts(10)).await;
        for r in &results {
            let clean = r.breakdown.combined() * stress;
            assert!((r.score - clean).abs() <= (1.0 - stress) * scale + 1e-5);
        }
    }

    #[tokio::test]
    async fn retrieval_refreshes_last_accessed() {
        let mut stream = MemoryStream::with_capacity(10);
        let record = stream.add_observation("a thing happened", 5, vec![], None, ts(0));
        let engine = engine_with_hash_embedder();
        let results = engine.retrieve(&mut stream, "thing", 1, 1.0, ts(900)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.last_accessed.tick, 900);
        assert_eq!(stream.by_id(record.id).map(|r| r.last_accessed.tick), Some(900));
    }

    #[tokio::test]
    async fn no_embedder_degrades_to_recency_importance() {
        let engine = RetrievalEngine::new(RetrievalConfig::default(), None);
        let mut stream = MemoryStream::with_capacity(10);
        stream.add_observation("dull", 1, vec![], None, ts(0));
        let vital = stream.add_observation("vital", 10, vec![], None, ts(0));
        let results = engine.retrieve(&mut stream, "whatever", 2, 1.0, ts(0)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, vital.id);
        assert_eq!(results[0].breakdown.relevance, 0.0);
    }

    #[tokio::test]
    async fn kind_and_location_variants_filter() {
        let engine = RetrievalEngine::new(RetrievalConfig::default(), None);
        let mut stream = MemoryStream::with_capacity(10);
        stream.add_observation("near origin", 5, vec![], Some(GridPos::new(1, 0)), ts(0));
        stream.add_reflection("an insight", 5, vec![], None, ts(0));
        stream.add_observation("far away", 5, vec![], Some(GridPos::new(20, 20)), ts(0));

        let reflections = engine
            .retrieve_by_kind(&mut stream, MemoryKind::Reflection, None, 5, 1.0, ts(1))
            .await;
        assert_eq!(reflections.len(), 1);
        assert_eq!(reflections[0].record.description, "an insight");

        let nearby = engine
            .retrieve_by_location(&mut stream, GridPos::new(0, 0), 3.0, None, 5, 1.0, ts(1))
            .await;
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].record.description, "near origin");
    }
}
