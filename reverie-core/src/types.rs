//! Core type definitions for the reverie cognitive system.
//!
//! All types are serializable so the host can snapshot and replay a
//! character's cognitive state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node in the plan hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new random plan ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reflection node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReflectionId(pub Uuid);

impl ReflectionId {
    /// Create a new random reflection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReflectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReflectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulated-seconds per simulated hour.
pub const TICKS_PER_HOUR: u64 = 3_600;
/// Simulated-seconds per simulated minute.
pub const TICKS_PER_MINUTE: u64 = 60;

/// In-simulation timestamp measured in ticks (one tick = one simulated second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTimestamp {
    /// Simulation tick (monotonically increasing).
    pub tick: u64,
    /// Corresponding real-world wall-clock time (for export metadata).
    pub real_time: DateTime<Utc>,
}

impl SimTimestamp {
    /// Create a new timestamp at the current wall-clock time.
    #[must_use]
    pub fn now(tick: u64) -> Self {
        Self {
            tick,
            real_time: Utc::now(),
        }
    }

    /// Simulated seconds elapsed since `other`.
    #[must_use]
    pub fn seconds_since(&self, other: &Self) -> f32 {
        self.tick.saturating_sub(other.tick) as f32
    }

    /// Simulated minutes elapsed since `other`.
    #[must_use]
    pub fn minutes_since(&self, other: &Self) -> f32 {
        self.seconds_since(other) / TICKS_PER_MINUTE as f32
    }

    /// Simulated hours elapsed since `other`.
    #[must_use]
    pub fn hours_since(&self, other: &Self) -> f32 {
        self.seconds_since(other) / TICKS_PER_HOUR as f32
    }

    /// A timestamp `minutes` simulated minutes after this one.
    #[must_use]
    pub fn plus_minutes(&self, minutes: u64) -> Self {
        Self {
            tick: self.tick + minutes * TICKS_PER_MINUTE,
            real_time: self.real_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A tile position on the host's 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Column (increases eastward).
    pub x: i32,
    /// Row (increases southward).
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another tile.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        dx.hypot(dy)
    }

    /// Manhattan distance to another tile.
    #[must_use]
    pub fn manhattan(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The adjacent tile in the given direction.
    #[must_use]
    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal direction on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Decreasing y.
    North,
    /// Increasing y.
    South,
    /// Increasing x.
    East,
    /// Decreasing x.
    West,
}

impl Direction {
    /// All four directions, in the fixed evaluation order used by heuristics.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Tile delta for this direction.
    #[must_use]
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
        }
    }

    /// Parse from a case-insensitive name ("north", "EAST", ...).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Some(Self::North),
            "south" | "s" => Some(Self::South),
            "east" | "e" => Some(Self::East),
            "west" | "w" => Some(Self::West),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::North => write!(f, "north"),
            Self::South => write!(f, "south"),
            Self::East => write!(f, "east"),
            Self::West => write!(f, "west"),
        }
    }
}

// ---------------------------------------------------------------------------
// Survival & items
// ---------------------------------------------------------------------------

/// A consumable item kind the character can seek out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Restores hunger.
    Food,
    /// Restores thirst.
    Water,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Food => write!(f, "food"),
            Self::Water => write!(f, "water"),
        }
    }
}

/// A survival need tracked by the host's resource simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedKind {
    /// Satisfied by food items.
    Hunger,
    /// Satisfied by water items.
    Thirst,
    /// Satisfied by resting.
    Energy,
}

impl NeedKind {
    /// The item kind that satisfies this need, if any.
    #[must_use]
    pub fn item(&self) -> Option<ItemKind> {
        match self {
            Self::Hunger => Some(ItemKind::Food),
            Self::Thirst => Some(ItemKind::Water),
            Self::Energy => None,
        }
    }
}

impl fmt::Display for NeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hunger => write!(f, "hunger"),
            Self::Thirst => write!(f, "thirst"),
            Self::Energy => write!(f, "energy"),
        }
    }
}

/// An item the character knows about, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemSighting {
    /// What kind of item it is.
    pub kind: ItemKind,
    /// Where it was seen.
    pub pos: GridPos,
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings, in \[-1.0, 1.0\].
    /// Returns 0.0 on mismatched dimensions or zero magnitude.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}
