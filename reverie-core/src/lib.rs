//! # Reverie Core
//!
//! The cognitive core of a simulated autonomous character: perceptions
//! become persisted memories, memories are scored and retrieved in
//! context, periodically distilled into higher-level insights, and the
//! whole of it drives a hierarchical planning and decision loop that
//! picks the character's next action.
//!
//! The pipeline, leaves first:
//!
//! - [`memory::MemoryStream`] — append-only, capacity-bounded record store
//! - [`retrieval::RetrievalEngine`] — recency/importance/relevance scoring
//!   with stress degradation
//! - [`reflection::ReflectionEngine`] — importance-sum-triggered insight
//!   synthesis into a reflection tree
//! - [`planning::PlanningSystem`] — daily → hourly → action decomposition
//!   with divergence-driven re-planning
//! - [`decision::DecisionMaker`] — priority-cascaded arbitration of the
//!   next action
//! - [`mind::CharacterMind`] — the per-character cooperative loop tying
//!   it together
//!
//! The language model and embedding provider are injected behind the
//! [`language::LanguageModel`] and [`embedding::EmbeddingProvider`]
//! contracts. Every consumer pairs them with a deterministic fallback:
//! with no capabilities configured at all, the character still perceives,
//! remembers, reflects, plans, and moves.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod decision;
pub mod embedding;
pub mod error;
pub mod language;
pub mod memory;
pub mod mind;
pub mod planning;
pub mod prompt;
pub mod reflection;
pub mod retrieval;
pub mod types;
pub mod world;

pub use config::CognitionConfig;
pub use decision::{Decision, DecisionAction, DecisionMaker};
pub use error::CognitionError;
pub use memory::{MemoryRecord, MemoryStream};
pub use mind::CharacterMind;
pub use types::*;
