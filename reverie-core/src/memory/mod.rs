//! The memory stream — append-only, capacity-bounded store of records.
//!
//! Records enter through the typed `add_*` constructors and leave only
//! through capacity-driven eviction, which silently drops the weakest
//! records by a retention score biased toward important and fresh memories.

pub mod record;

pub use record::{MemoryKind, MemoryRecord, REFLECTION_TAG, derived_from_tag};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::error::{CognitionError, Result};
use crate::types::{Embedding, GridPos, MemoryId, SimTimestamp};

/// Aggregate statistics over the stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryStatistics {
    /// Total records currently held.
    pub total: usize,
    /// Observation records.
    pub observations: usize,
    /// Reflection records.
    pub reflections: usize,
    /// Plan records.
    pub plans: usize,
    /// Records with a cached embedding.
    pub embedded: usize,
    /// Mean importance across all records (0.0 when empty).
    pub mean_importance: f32,
}

/// Append-only, capacity-bounded store of memory records.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    records: Vec<MemoryRecord>,
    config: MemoryConfig,
}

impl MemoryStream {
    /// Create an empty stream with the given retention configuration.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            records: Vec::new(),
            config,
        }
    }

    /// Create an empty stream with the given capacity and default weights.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(MemoryConfig {
            capacity,
            ..MemoryConfig::default()
        })
    }

    // -----------------------------------------------------------------------
    // Writers
    // -----------------------------------------------------------------------

    /// Store a raw perception.
    pub fn add_observation(
        &mut self,
        description: impl Into<String>,
        importance: u8,
        tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> MemoryRecord {
        self.add(MemoryKind::Observation, description, importance, tags, location, now)
    }

    /// Store a synthesized insight. The `reflection` tag is always present.
    pub fn add_reflection(
        &mut self,
        description: impl Into<String>,
        importance: u8,
        mut tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> MemoryRecord {
        if !tags.iter().any(|t| t == REFLECTION_TAG) {
            tags.insert(0, REFLECTION_TAG.to_string());
        }
        self.add(MemoryKind::Reflection, description, importance, tags, location, now)
    }

    /// Store a record of an intention or plan step.
    pub fn add_plan(
        &mut self,
        description: impl Into<String>,
        importance: u8,
        tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> MemoryRecord {
        self.add(MemoryKind::Plan, description, importance, tags, location, now)
    }

    fn add(
        &mut self,
        kind: MemoryKind,
        description: impl Into<String>,
        importance: u8,
        tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> MemoryRecord {
        let record = MemoryRecord::new(kind, description, importance, tags, location, now);
        let stored = record.clone();
        self.records.push(record);
        self.evict_overflow(now);
        stored
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    /// All records, oldest first.
    #[must_use]
    pub fn all(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// Records of one kind, oldest first.
    #[must_use]
    pub fn by_kind(&self, kind: MemoryKind) -> Vec<&MemoryRecord> {
        self.records.iter().filter(|r| r.kind == kind).collect()
    }

    /// Records carrying the given tag.
    #[must_use]
    pub fn by_tag(&self, tag: &str) -> Vec<&MemoryRecord> {
        self.records.iter().filter(|r| r.has_tag(tag)).collect()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn by_id(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records created inside `[start, end]` (inclusive, by tick).
    #[must_use]
    pub fn in_time_range(&self, start: SimTimestamp, end: SimTimestamp) -> Vec<&MemoryRecord> {
        self.records
            .iter()
            .filter(|r| r.created_at.tick >= start.tick && r.created_at.tick <= end.tick)
            .collect()
    }

    /// Records located within `radius` tiles of `point`.
    #[must_use]
    pub fn near_location(&self, point: GridPos, radius: f32) -> Vec<&MemoryRecord> {
        self.records
            .iter()
            .filter(|r| r.location.is_some_and(|loc| loc.distance(&point) <= radius))
            .collect()
    }

    /// Ids and descriptions of records without a cached embedding.
    #[must_use]
    pub fn needing_embeddings(&self) -> Vec<(MemoryId, String)> {
        self.records
            .iter()
            .filter(|r| r.embedding.is_none())
            .map(|r| (r.id, r.description.clone()))
            .collect()
    }

    /// Aggregate statistics over the stream.
    #[must_use]
    pub fn statistics(&self) -> MemoryStatistics {
        let total = self.records.len();
        let mut stats = MemoryStatistics {
            total,
            ..MemoryStatistics::default()
        };
        let mut importance_sum = 0u32;
        for record in &self.records {
            match record.kind {
                MemoryKind::Observation => stats.observations += 1,
                MemoryKind::Reflection => stats.reflections += 1,
                MemoryKind::Plan => stats.plans += 1,
            }
            if record.embedding.is_some() {
                stats.embedded += 1;
            }
            importance_sum += u32::from(record.importance);
        }
        if total > 0 {
            stats.mean_importance = importance_sum as f32 / total as f32;
        }
        stats
    }

    // -----------------------------------------------------------------------
    // Mutators (the only ones the data model allows)
    // -----------------------------------------------------------------------

    /// Refresh a record's `last_accessed`. Unknown ids are a logged no-op.
    pub fn mark_accessed(&mut self, id: MemoryId, now: SimTimestamp) {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => record.record_access(now),
            None => warn!(%id, "mark_accessed on unknown memory id"),
        }
    }

    /// Cache an embedding on a record. Unknown ids are a logged no-op.
    pub fn set_embedding(&mut self, id: MemoryId, embedding: Embedding) {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => record.embedding = Some(embedding),
            None => warn!(%id, "set_embedding on unknown memory id"),
        }
    }

    /// Add a tag to a record. Unknown ids are a logged no-op.
    pub fn add_tag(&mut self, id: MemoryId, tag: impl Into<String>) {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => record.add_tag(tag),
            None => warn!(%id, "add_tag on unknown memory id"),
        }
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Retention score: `0.4·recency + 0.6·importance/10` with
    /// `recency = e^(−hours_since_creation/24)`. Lower scores go first.
    fn retention_score(&self, record: &MemoryRecord, now: SimTimestamp) -> f32 {
        let recency = (-now.hours_since(&record.created_at) / 24.0).exp();
        self.config.retention_recency_weight * recency
            + self.config.retention_importance_weight * f32::from(record.importance) / 10.0
    }

    /// Silent eviction pass, run after every insert. An insert that pushes
    /// the stream beyond capacity sheds the lowest-retention records until
    /// the stream is back under its cap; overflow never raises an error.
    fn evict_overflow(&mut self, now: SimTimestamp) {
        if self.records.len() <= self.config.capacity {
            return;
        }
        let mut evicted = 0usize;
        while self.records.len() >= self.config.capacity {
            let weakest = self
                .records
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let sa = self.retention_score(a, now);
                    let sb = self.retention_score(b, now);
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            let Some(index) = weakest else { break };
            let dropped = self.records.remove(index);
            debug!(
                id = %dropped.id,
                importance = dropped.importance,
                "evicting low-retention memory"
            );
            evicted += 1;
        }
        debug!(evicted, remaining = self.records.len(), "memory stream overflow pass");
    }

    // -----------------------------------------------------------------------
    // Export surface
    // -----------------------------------------------------------------------

    /// Serialize the full record list to JSON for host-side persistence.
    ///
    /// # Errors
    /// Returns `CognitionError::Serialization` if encoding fails.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string(&self.records)
            .map_err(|e| CognitionError::Serialization(e.to_string()))
    }

    /// Replace the record list from a JSON export. Returns the record count.
    ///
    /// # Errors
    /// Returns `CognitionError::Serialization` on malformed input; the
    /// existing records are left untouched in that case.
    pub fn import_json(&mut self, json: &str) -> Result<usize> {
        let records: Vec<MemoryRecord> = serde_json::from_str(json)
            .map_err(|e| CognitionError::Serialization(e.to_string()))?;
        let count = records.len();
        self.records = records;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TICKS_PER_MINUTE;

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    #[test]
    fn reflection_records_always_tagged() {
        let mut stream = MemoryStream::with_capacity(10);
        let record = stream.add_reflection("an insight", 6, vec![], None, ts(0));
        assert_eq!(record.kind, MemoryKind::Reflection);
        assert!(record.has_tag(REFLECTION_TAG));
    }

    #[test]
    fn overflow_evicts_lowest_retention() {
        // Capacity 3, importances [2, 9, 2, 2]: the fourth insert triggers
        // the overflow pass, which keeps only the importance-9 record from
        // the first three plus the new insert.
        let mut stream = MemoryStream::with_capacity(3);
        for (i, importance) in [2u8, 9, 2, 2].iter().enumerate() {
            stream.add_observation(
                format!("event {i}"),
                *importance,
                vec![],
                None,
                ts(i as u64 * TICKS_PER_MINUTE),
            );
        }
        assert_eq!(stream.all().len(), 2);
        let importances: Vec<u8> = stream.all().iter().map(|r| r.importance).collect();
        assert!(importances.contains(&9));
        assert_eq!(stream.all().last().map(|r| r.description.as_str()), Some("event 3"));
    }

    #[test]
    fn capacity_never_exceeded() {
        let mut stream = MemoryStream::with_capacity(5);
        for i in 0..50u64 {
            stream.add_observation(format!("event {i}"), (i % 10) as u8, vec![], None, ts(i));
            assert!(stream.all().len() <= 5);
        }
    }

    #[test]
    fn queries_filter_as_expected() {
        let mut stream = MemoryStream::with_capacity(20);
        stream.add_observation("saw a wall", 3, vec!["maze".into()], Some(GridPos::new(1, 1)), ts(10));
        stream.add_plan("head east", 4, vec![], None, ts(20));
        stream.add_observation("found water", 7, vec!["water".into()], Some(GridPos::new(8, 8)), ts(30));

        assert_eq!(stream.by_kind(MemoryKind::Observation).len(), 2);
        assert_eq!(stream.by_tag("maze").len(), 1);
        assert_eq!(stream.in_time_range(ts(15), ts(25)).len(), 1);
        assert_eq!(stream.near_location(GridPos::new(0, 0), 2.0).len(), 1);
    }

    #[test]
    fn statistics_track_kinds_and_mean() {
        let mut stream = MemoryStream::with_capacity(20);
        stream.add_observation("a", 2, vec![], None, ts(0));
        stream.add_reflection("b", 8, vec![], None, ts(1));
        let stats = stream.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.observations, 1);
        assert_eq!(stats.reflections, 1);
        assert_eq!(stats.embedded, 0);
        assert!((stats.mean_importance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn mark_accessed_refreshes_timestamp() {
        let mut stream = MemoryStream::with_capacity(5);
        let record = stream.add_observation("a", 5, vec![], None, ts(0));
        stream.mark_accessed(record.id, ts(500));
        assert_eq!(stream.by_id(record.id).map(|r| r.last_accessed.tick), Some(500));
        // Unknown id: logged no-op, no panic.
        stream.mark_accessed(MemoryId::new(), ts(600));
    }

    #[test]
    fn export_import_round_trip() {
        let mut stream = MemoryStream::with_capacity(5);
        stream.add_observation("a", 5, vec!["t".into()], Some(GridPos::new(2, 3)), ts(0));
        stream.add_reflection("b", 7, vec![], None, ts(1));
        let json = stream.export_json().expect("export");

        let mut restored = MemoryStream::with_capacity(5);
        let count = restored.import_json(&json).expect("import");
        assert_eq!(count, 2);
        assert_eq!(restored.all().len(), 2);
        assert_eq!(restored.all()[0].description, "a");
        assert!(restored.all()[1].has_tag(REFLECTION_TAG));
    }

    #[test]
    fn import_rejects_garbage_without_clobbering() {
        let mut stream = MemoryStream::with_capacity(5);
        stream.add_observation("keep me", 5, vec![], None, ts(0));
        assert!(stream.import_json("not json").is_err());
        assert_eq!(stream.all().len(), 1);
    }
}
