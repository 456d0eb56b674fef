//! Read-only collaborator contracts onto the host world.
//!
//! The cognitive core consumes survival levels, maze geometry, and item
//! positions through these traits and never reaches into host state
//! directly. Simple fixed implementations are provided for tests and
//! host bring-up, in the same spirit as the stub embedding provider.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, GridPos, ItemKind, ItemSighting, NeedKind};

// ---------------------------------------------------------------------------
// Survival
// ---------------------------------------------------------------------------

/// Snapshot of the host's survival simulation. All levels are 0-100,
/// where low means deprived (and for stress, high means stressed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SurvivalSnapshot {
    /// Satiation level.
    pub hunger: f32,
    /// Hydration level.
    pub thirst: f32,
    /// Rest level.
    pub energy: f32,
    /// Acute stress level.
    pub stress: f32,
}

impl SurvivalSnapshot {
    /// A fully rested, unstressed baseline.
    pub const FULL: Self = Self {
        hunger: 100.0,
        thirst: 100.0,
        energy: 100.0,
        stress: 0.0,
    };

    /// Map the stress level onto the retrieval degradation factor:
    /// 0 stress → 1.0 (no degradation), 100 stress → 0.5 (worst case).
    #[must_use]
    pub fn stress_modifier(&self) -> f32 {
        1.0 - (self.stress.clamp(0.0, 100.0) / 100.0) * 0.5
    }

    /// The level of a given need.
    #[must_use]
    pub fn level(&self, need: NeedKind) -> f32 {
        match need {
            NeedKind::Hunger => self.hunger,
            NeedKind::Thirst => self.thirst,
            NeedKind::Energy => self.energy,
        }
    }
}

impl Default for SurvivalSnapshot {
    fn default() -> Self {
        Self::FULL
    }
}

/// The single most pressing need, as reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UrgentNeed {
    /// Which need is pressing.
    pub kind: NeedKind,
    /// Its current level (0-100).
    pub level: f32,
}

/// Read-only access to the survival/resource simulation.
pub trait SurvivalAccessor: Send + Sync {
    /// Current survival levels.
    fn snapshot(&self) -> SurvivalSnapshot;

    /// The most urgent need, if any resource is running low.
    fn most_urgent_need(&self) -> Option<UrgentNeed>;
}

/// Fixed survival state for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSurvival {
    /// The snapshot to report.
    pub snapshot: SurvivalSnapshot,
    /// The urgent need to report.
    pub urgent: Option<UrgentNeed>,
}

impl SurvivalAccessor for FixedSurvival {
    fn snapshot(&self) -> SurvivalSnapshot {
        self.snapshot
    }

    fn most_urgent_need(&self) -> Option<UrgentNeed> {
        self.urgent
    }
}

// ---------------------------------------------------------------------------
// Maze
// ---------------------------------------------------------------------------

/// Wall flags for a single tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallFlags {
    /// Wall on the north edge.
    pub north: bool,
    /// Wall on the east edge.
    pub east: bool,
    /// Wall on the south edge.
    pub south: bool,
    /// Wall on the west edge.
    pub west: bool,
}

impl WallFlags {
    /// Whether the given edge is walled.
    #[must_use]
    pub fn blocked(&self, direction: Direction) -> bool {
        match direction {
            Direction::North => self.north,
            Direction::East => self.east,
            Direction::South => self.south,
            Direction::West => self.west,
        }
    }
}

/// Read-only access to the host maze geometry.
pub trait MazeAccessor: Send + Sync {
    /// Grid bounds as (width, height).
    fn bounds(&self) -> (i32, i32);

    /// Wall flags for a tile.
    fn walls(&self, pos: GridPos) -> WallFlags;

    /// The maze entrance tile.
    fn entrance(&self) -> GridPos;

    /// The maze exit tile.
    fn exit(&self) -> GridPos;

    /// Whether a tile lies inside the grid.
    fn in_bounds(&self, pos: GridPos) -> bool {
        let (w, h) = self.bounds();
        pos.x >= 0 && pos.y >= 0 && pos.x < w && pos.y < h
    }

    /// Whether a step from `pos` toward `direction` is possible.
    fn is_open(&self, pos: GridPos, direction: Direction) -> bool {
        !self.walls(pos).blocked(direction) && self.in_bounds(pos.step(direction))
    }
}

/// Categorical summary of the tile the character stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Surroundings {
    /// At most one open exit.
    DeadEnd,
    /// Exactly two open exits.
    Corridor,
    /// Three or more open exits.
    Junction,
    /// Standing on the entrance tile.
    AtEntrance,
    /// Standing on the exit tile.
    AtExit,
}

impl std::fmt::Display for Surroundings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadEnd => write!(f, "a dead end"),
            Self::Corridor => write!(f, "a corridor"),
            Self::Junction => write!(f, "a junction"),
            Self::AtEntrance => write!(f, "the maze entrance"),
            Self::AtExit => write!(f, "the maze exit"),
        }
    }
}

/// Classify a tile from its wall flags.
#[must_use]
pub fn classify_surroundings(maze: &dyn MazeAccessor, pos: GridPos) -> Surroundings {
    if pos == maze.entrance() {
        return Surroundings::AtEntrance;
    }
    if pos == maze.exit() {
        return Surroundings::AtExit;
    }
    let open = Direction::ALL
        .iter()
        .filter(|d| maze.is_open(pos, **d))
        .count();
    match open {
        0 | 1 => Surroundings::DeadEnd,
        2 => Surroundings::Corridor,
        _ => Surroundings::Junction,
    }
}

/// A wall-less rectangular grid. Useful for tests and host bring-up;
/// real geometry comes from the host's maze generator.
#[derive(Debug, Clone, Copy)]
pub struct OpenGrid {
    /// Grid width.
    pub width: i32,
    /// Grid height.
    pub height: i32,
    /// Entrance tile.
    pub entrance: GridPos,
    /// Exit tile.
    pub exit: GridPos,
}

impl MazeAccessor for OpenGrid {
    fn bounds(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn walls(&self, _pos: GridPos) -> WallFlags {
        WallFlags::default()
    }

    fn entrance(&self) -> GridPos {
        self.entrance
    }

    fn exit(&self) -> GridPos {
        self.exit
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Read-only access to known item locations.
pub trait ItemAccessor: Send + Sync {
    /// Nearest known item of the given kind, if any.
    fn nearest_item(&self, from: GridPos, kind: ItemKind) -> Option<GridPos>;

    /// All known items within `radius` of `pos`.
    fn items_near(&self, pos: GridPos, radius: f32) -> Vec<ItemSighting>;
}

/// Fixed item set for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticItems(pub Vec<ItemSighting>);

impl ItemAccessor for StaticItems {
    fn nearest_item(&self, from: GridPos, kind: ItemKind) -> Option<GridPos> {
        self.0
            .iter()
            .filter(|item| item.kind == kind)
            .min_by(|a, b| {
                a.pos
                    .distance(&from)
                    .partial_cmp(&b.pos.distance(&from))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|item| item.pos)
    }

    fn items_near(&self, pos: GridPos, radius: f32) -> Vec<ItemSighting> {
        self.0
            .iter()
            .filter(|item| item.pos.distance(&pos) <= radius)
            .copied()
            .collect()
    }
}
