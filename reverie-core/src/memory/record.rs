//! A single memory record — the unit of experience in the memory stream.

use serde::{Deserialize, Serialize};

use crate::types::{Embedding, GridPos, MemoryId, SimTimestamp};

/// Tag carried by every reflection record.
pub const REFLECTION_TAG: &str = "reflection";

/// Build the back-reference tag encoding the memory ids a reflection was
/// derived from.
#[must_use]
pub fn derived_from_tag(sources: &[MemoryId]) -> String {
    let ids: Vec<String> = sources.iter().map(ToString::to_string).collect();
    format!("derived:{}", ids.join(","))
}

/// What kind of experience a record captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryKind {
    /// A raw perception of the world.
    Observation,
    /// A synthesized higher-level insight.
    Reflection,
    /// A record of an intention or plan step.
    Plan,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observation => write!(f, "observation"),
            Self::Reflection => write!(f, "reflection"),
            Self::Plan => write!(f, "plan"),
        }
    }
}

/// A timestamped, importance-scored unit of experience.
///
/// Records are immutable after creation except for `last_accessed`,
/// `embedding`, and tag additions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: MemoryId,
    /// Natural-language description of the experience.
    pub description: String,
    /// When the record was created (simulation time).
    pub created_at: SimTimestamp,
    /// Last time this record was retrieved or otherwise touched.
    pub last_accessed: SimTimestamp,
    /// Observation, reflection, or plan.
    pub kind: MemoryKind,
    /// Significance on a 1-10 integer scale, clamped on write.
    pub importance: u8,
    /// Ordered, deduplicated string tags.
    pub tags: Vec<String>,
    /// Where the experience happened, if anywhere.
    pub location: Option<GridPos>,
    /// Vector embedding for semantic retrieval (lazily computed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl MemoryRecord {
    /// Create a new record, clamping importance into \[1, 10\].
    #[must_use]
    pub fn new(
        kind: MemoryKind,
        description: impl Into<String>,
        importance: u8,
        tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> Self {
        let mut record = Self {
            id: MemoryId::new(),
            description: description.into(),
            created_at: now,
            last_accessed: now,
            kind,
            importance: importance.clamp(1, 10),
            tags: Vec::new(),
            location,
            embedding: None,
        };
        for tag in tags {
            record.add_tag(tag);
        }
        record
    }

    /// Record an access (recall).
    pub fn record_access(&mut self, now: SimTimestamp) {
        self.last_accessed = now;
    }

    /// Add a tag, preserving insertion order and skipping duplicates.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.iter().any(|t| t == &tag) {
            self.tags.push(tag);
        }
    }

    /// Whether this record carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
