//! The per-character cognitive loop.
//!
//! One [`CharacterMind`] exclusively owns one character's mutable
//! cognitive state — memory stream, reflection tree, plan hierarchy — so
//! no locks are needed anywhere in the pipeline. Each tick runs exactly
//! one reflection check, one planning check, and one decision. Reflection
//! generation is spawned as a background task with its own error boundary
//! and reports back over a channel the next tick drains; a slow or broken
//! reflection never stalls the decision loop. Capability calls are the
//! only suspension points, and they block only this character.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::CognitionConfig;
use crate::decision::{Decision, DecisionInputs, DecisionMaker};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::language::LanguageModel;
use crate::memory::{MemoryRecord, MemoryStream};
use crate::planning::{PlanContext, PlanningSystem, ReplanReason};
use crate::reflection::{ReflectionEngine, ReflectionOutcome, ReflectionTree};
use crate::retrieval::RetrievalEngine;
use crate::types::{GridPos, SimTimestamp};
use crate::world::{ItemAccessor, MazeAccessor, SurvivalAccessor};

/// Read-only world state handed to one tick.
pub struct TickInputs<'a> {
    /// Survival levels and urgent-need signal.
    pub survival: &'a dyn SurvivalAccessor,
    /// Maze geometry.
    pub maze: &'a dyn MazeAccessor,
    /// Known item locations.
    pub items: &'a dyn ItemAccessor,
    /// Current tile.
    pub position: GridPos,
    /// Fraction of the maze explored, in \[0, 1\].
    pub exploration_progress: f32,
    /// Whether the character has discovered the exit.
    pub exit_discovered: bool,
    /// Current simulation time.
    pub now: SimTimestamp,
}

/// The cognitive core of one simulated character.
pub struct CharacterMind {
    config: CognitionConfig,
    stream: MemoryStream,
    retrieval: RetrievalEngine,
    reflection: ReflectionEngine,
    planner: PlanningSystem,
    decider: DecisionMaker,
    replan_rx: mpsc::UnboundedReceiver<ReplanReason>,
    reflection_tx: mpsc::UnboundedSender<ReflectionOutcome>,
    reflection_rx: mpsc::UnboundedReceiver<ReflectionOutcome>,
    reflection_in_flight: bool,
}

impl CharacterMind {
    /// Assemble the full pipeline around one language model and one
    /// optional embedding provider. Both may be absent or broken; every
    /// component carries a deterministic fallback.
    #[must_use]
    pub fn new(
        config: CognitionConfig,
        llm: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let (replan_tx, replan_rx) = mpsc::unbounded_channel();
        let (reflection_tx, reflection_rx) = mpsc::unbounded_channel();
        Self {
            stream: MemoryStream::new(config.memory.clone()),
            retrieval: RetrievalEngine::new(config.retrieval.clone(), embedder.clone()),
            reflection: ReflectionEngine::new(
                config.reflection.clone(),
                config.retrieval.clone(),
                Arc::clone(&llm),
                embedder,
            ),
            planner: PlanningSystem::new(config.planning.clone(), Arc::clone(&llm)),
            decider: DecisionMaker::new(config.decision.clone(), llm)
                .with_replan_channel(replan_tx),
            replan_rx,
            reflection_tx,
            reflection_rx,
            reflection_in_flight: false,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Perception feed
    // -----------------------------------------------------------------------

    /// Record a perception into the memory stream and feed the reflection
    /// accumulator. This is the host's write path into the pipeline.
    pub fn observe(
        &mut self,
        description: impl Into<String>,
        importance: u8,
        tags: Vec<String>,
        location: Option<GridPos>,
        now: SimTimestamp,
    ) -> MemoryRecord {
        let record = self
            .stream
            .add_observation(description, importance, tags, location, now);
        self.reflection.note_memory(&record);
        record
    }

    // -----------------------------------------------------------------------
    // The loop
    // -----------------------------------------------------------------------

    /// Run one cognitive tick: merge finished reflections, handle re-plan
    /// requests and triggers, keep the active hour decomposed, check the
    /// reflection trigger, and make one decision.
    pub async fn tick(&mut self, world: &TickInputs<'_>) -> Decision {
        let now = world.now;
        self.drain_reflections(now);

        let ctx = self.plan_context(world);

        // Re-plan requests from the decision maker (fire-and-forget), then
        // the tick's own monitor check. First reason wins.
        let mut replan_reason = None;
        while let Ok(reason) = self.replan_rx.try_recv() {
            replan_reason.get_or_insert(reason);
        }
        if replan_reason.is_none() {
            replan_reason = self.planner.monitor_for_replanning(&ctx, now);
        }
        if let Some(reason) = replan_reason {
            self.planner.replan(reason, &ctx, now).await;
        }
        self.planner.ensure_actions(&ctx, now).await;

        self.maybe_spawn_reflection(now);

        let goal = world.exit_discovered.then(|| world.maze.exit());
        let goal_text = match goal {
            Some(exit) => format!("reach the exit at {exit}"),
            None => "find the exit of the maze".to_string(),
        };
        let mut inputs = DecisionInputs {
            stream: &mut self.stream,
            planner: &mut self.planner,
            retrieval: &self.retrieval,
            survival: world.survival,
            maze: world.maze,
            items: world.items,
            position: world.position,
            goal,
            goal_text,
            now,
        };
        self.decider.decide(&mut inputs).await
    }

    fn plan_context(&self, world: &TickInputs<'_>) -> PlanContext {
        let recent_memories: Vec<String> = self
            .stream
            .all()
            .iter()
            .rev()
            .take(self.config.decision.recent_memories_in_prompt)
            .map(|r| r.description.clone())
            .collect();
        PlanContext {
            position: world.position,
            survival: world.survival.snapshot(),
            exploration_progress: world.exploration_progress,
            exit: world.exit_discovered.then(|| world.maze.exit()),
            nearby_items: world
                .items
                .items_near(world.position, self.config.planning.item_cluster_radius),
            recent_memories,
        }
    }

    /// Merge any reflection outcomes that finished since the last tick.
    fn drain_reflections(&mut self, now: SimTimestamp) {
        while let Ok(outcome) = self.reflection_rx.try_recv() {
            self.reflection_in_flight = false;
            if outcome.is_empty() {
                debug!("reflection pass produced nothing to merge");
                continue;
            }
            self.reflection.absorb(outcome, &mut self.stream, now);
        }
    }

    /// Fire the reflection trigger check and, if due, spawn the pass in
    /// the background. The loop never awaits it.
    fn maybe_spawn_reflection(&mut self, now: SimTimestamp) {
        if self.reflection_in_flight {
            return;
        }
        let Some(trigger) = self.reflection.check_trigger(&self.stream, now) else {
            return;
        };
        debug!(?trigger, "reflection triggered, spawning background pass");
        let job = self.reflection.prepare_job(&self.stream, trigger, now);
        let prior_level1 = self.reflection.tree().at_level(1).len();
        let tx = self.reflection_tx.clone();
        self.reflection_in_flight = true;
        tokio::spawn(async move {
            let outcome = job.run(prior_level1).await;
            if tx.send(outcome).is_err() {
                warn!("reflection outcome dropped: mind was torn down");
            }
        });
    }

    // -----------------------------------------------------------------------
    // Introspection & export
    // -----------------------------------------------------------------------

    /// The memory stream.
    #[must_use]
    pub fn stream(&self) -> &MemoryStream {
        &self.stream
    }

    /// The reflection tree built so far.
    #[must_use]
    pub fn reflection_tree(&self) -> &ReflectionTree {
        self.reflection.tree()
    }

    /// The planning system.
    #[must_use]
    pub fn planner(&self) -> &PlanningSystem {
        &self.planner
    }

    /// Export the memory stream as JSON for host persistence.
    ///
    /// # Errors
    /// Returns `CognitionError::Serialization` if encoding fails.
    pub fn export_memories(&self) -> Result<String> {
        self.stream.export_json()
    }

    /// Restore the memory stream from a JSON export.
    ///
    /// # Errors
    /// Returns `CognitionError::Serialization` on malformed input.
    pub fn import_memories(&mut self, json: &str) -> Result<usize> {
        self.stream.import_json(json)
    }
}
