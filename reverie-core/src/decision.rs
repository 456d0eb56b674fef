//! Decision arbitration — the single entry point that picks the next step.
//!
//! A priority cascade, first applicable wins: critical survival override
//! (when the active plan isn't already handling the need), then the active
//! plan action, then a reactive model-or-heuristic choice. Every path
//! yields a well-formed [`Decision`] — total capability failure degrades
//! to deterministic pathing, never to an error.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::DecisionConfig;
use crate::language::{GenerationOptions, LanguageModel, generate_or_fallback};
use crate::memory::MemoryStream;
use crate::planning::{ActionKind, PlanningSystem, ReplanReason};
use crate::prompt;
use crate::retrieval::RetrievalEngine;
use crate::types::{Direction, GridPos, SimTimestamp};
use crate::world::{ItemAccessor, MazeAccessor, SurvivalAccessor, classify_surroundings};

// ---------------------------------------------------------------------------
// Decision value
// ---------------------------------------------------------------------------

/// What the character does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    /// Step in a cardinal direction.
    Move,
    /// Stay put this step.
    Wait,
    /// Pause and reflect.
    Reflect,
}

/// The arbitration result. A pure value object — never persisted.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Chosen action.
    pub action: DecisionAction,
    /// Direction, when the action is a move.
    pub direction: Option<Direction>,
    /// Why this decision was taken.
    pub reasoning: String,
    /// Confidence in the choice, in \[0, 1\].
    pub confidence: f32,
}

impl Decision {
    /// A move decision.
    #[must_use]
    pub fn step(direction: Direction, reasoning: impl Into<String>, confidence: f32) -> Self {
        Self {
            action: DecisionAction::Move,
            direction: Some(direction),
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// A wait decision.
    #[must_use]
    pub fn wait(reasoning: impl Into<String>, confidence: f32) -> Self {
        Self {
            action: DecisionAction::Wait,
            direction: None,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// A reflect decision.
    #[must_use]
    pub fn reflect(reasoning: impl Into<String>, confidence: f32) -> Self {
        Self {
            action: DecisionAction::Reflect,
            direction: None,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything one decision may consult, borrowed per call.
pub struct DecisionInputs<'a> {
    /// The character's memory stream.
    pub stream: &'a mut MemoryStream,
    /// The character's planning system.
    pub planner: &'a mut PlanningSystem,
    /// Retrieval engine for the reactive prompt.
    pub retrieval: &'a RetrievalEngine,
    /// Survival levels and urgent-need signal.
    pub survival: &'a dyn SurvivalAccessor,
    /// Maze geometry.
    pub maze: &'a dyn MazeAccessor,
    /// Known item locations.
    pub items: &'a dyn ItemAccessor,
    /// Current tile.
    pub position: GridPos,
    /// The character's known goal position, once discovered.
    pub goal: Option<GridPos>,
    /// Natural-language goal for prompts.
    pub goal_text: String,
    /// Current simulation time.
    pub now: SimTimestamp,
}

// ---------------------------------------------------------------------------
// Decision maker
// ---------------------------------------------------------------------------

/// The top-level arbitrator for one character.
pub struct DecisionMaker {
    config: DecisionConfig,
    llm: Arc<dyn LanguageModel>,
    last_decision: Option<SimTimestamp>,
    replan_tx: Option<mpsc::UnboundedSender<ReplanReason>>,
}

impl DecisionMaker {
    /// Create a new decision maker.
    #[must_use]
    pub fn new(config: DecisionConfig, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            llm,
            last_decision: None,
            replan_tx: None,
        }
    }

    /// Attach the fire-and-forget re-plan request channel.
    #[must_use]
    pub fn with_replan_channel(mut self, tx: mpsc::UnboundedSender<ReplanReason>) -> Self {
        self.replan_tx = Some(tx);
        self
    }

    /// Arbitrate the next action. Calls inside the minimum interval
    /// short-circuit to `Wait`; everything else walks the cascade.
    pub async fn decide(&mut self, inputs: &mut DecisionInputs<'_>) -> Decision {
        if let Some(last) = self.last_decision {
            if inputs.now.seconds_since(&last) < self.config.min_interval_seconds {
                return Decision::wait("waiting out the decision interval", 1.0);
            }
        }
        self.last_decision = Some(inputs.now);

        if let Some(decision) = self.survival_override(inputs) {
            return decision;
        }
        if let Some(decision) = self.execute_plan_action(inputs) {
            return decision;
        }
        self.reactive_decision(inputs).await
    }

    // -----------------------------------------------------------------------
    // Cascade step 1: critical survival override
    // -----------------------------------------------------------------------

    /// Overrides everything else when a need is critical and a matching
    /// item is known — unless the active plan action is already seeking or
    /// consuming that very item kind.
    fn survival_override(&self, inputs: &mut DecisionInputs<'_>) -> Option<Decision> {
        let need = inputs.survival.most_urgent_need()?;
        if need.level >= self.config.critical_override_threshold {
            return None;
        }

        let wanted = need.kind.item();
        if let Some(action) = inputs.planner.current_action(inputs.now) {
            let already_handling = matches!(
                action.kind,
                ActionKind::SeekItem | ActionKind::ConsumeItem
            ) && action.target_item == wanted;
            if already_handling {
                return None;
            }
        }

        let Some(kind) = wanted else {
            // Energy has no item to chase; rest on the spot.
            self.request_replan(ReplanReason::ResourceCritical(need.kind));
            return Some(Decision::wait(
                format!("critically low {}: resting where I stand", need.kind),
                0.9,
            ));
        };

        let target = inputs.items.nearest_item(inputs.position, kind)?;
        let direction = improving_step(inputs.maze, inputs.position, target)
            .or_else(|| open_step(inputs.maze, inputs.position))?;

        self.request_replan(ReplanReason::ResourceCritical(need.kind));
        Some(Decision::step(
            direction,
            format!(
                "critical {} ({:.0}): heading for the {kind} at {target}",
                need.kind, need.level
            ),
            0.9,
        ))
    }

    /// Fire-and-forget: a dropped channel is logged, never surfaced.
    fn request_replan(&self, reason: ReplanReason) {
        if let Some(tx) = &self.replan_tx {
            if let Err(e) = tx.send(reason) {
                warn!(error = %e, "re-plan request channel closed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cascade step 2: active plan action
    // -----------------------------------------------------------------------

    fn execute_plan_action(&self, inputs: &mut DecisionInputs<'_>) -> Option<Decision> {
        let action = inputs.planner.current_action(inputs.now)?;
        debug!(kind = %action.kind, id = %action.id, "executing plan action");

        match action.kind {
            ActionKind::Move => {
                let Some(target) = action.target_pos.or(inputs.goal) else {
                    return Some(self.explore_step(inputs, &action.description));
                };
                if inputs.position == target {
                    inputs.planner.complete_action(action.id, inputs.now);
                    return Some(Decision::wait(format!("arrived at {target}"), 0.8));
                }
                match improving_step(inputs.maze, inputs.position, target)
                    .or_else(|| open_step(inputs.maze, inputs.position))
                {
                    Some(direction) => Some(Decision::step(
                        direction,
                        format!("{} (toward {target})", action.description),
                        0.8,
                    )),
                    None => {
                        inputs.planner.fail_action(action.id, inputs.now);
                        Some(Decision::wait("boxed in, cannot advance", 0.3))
                    }
                }
            }
            ActionKind::Explore => {
                // An exploration quantum is done once its window elapses;
                // the next action picks up from wherever it wandered to.
                let window_end =
                    action.start.tick + u64::from(action.duration_minutes) * 60;
                if inputs.now.tick >= window_end {
                    inputs.planner.complete_action(action.id, inputs.now);
                }
                Some(self.explore_step(inputs, &action.description))
            }
            ActionKind::SeekItem | ActionKind::ConsumeItem => {
                let Some(kind) = action.target_item else {
                    inputs.planner.fail_action(action.id, inputs.now);
                    return Some(Decision::wait("seek action without an item kind", 0.3));
                };
                let Some(target) = action
                    .target_pos
                    .or_else(|| inputs.items.nearest_item(inputs.position, kind))
                else {
                    inputs.planner.fail_action(action.id, inputs.now);
                    return Some(Decision::wait(format!("no {kind} known anywhere"), 0.4));
                };
                if inputs.position == target {
                    inputs.planner.complete_action(action.id, inputs.now);
                    let verb = if action.kind == ActionKind::ConsumeItem {
                        "consuming"
                    } else {
                        "reached"
                    };
                    return Some(Decision::wait(format!("{verb} the {kind} here"), 0.9));
                }
                match improving_step(inputs.maze, inputs.position, target)
                    .or_else(|| open_step(inputs.maze, inputs.position))
                {
                    Some(direction) => Some(Decision::step(
                        direction,
                        format!("tracking down {kind} at {target}"),
                        0.8,
                    )),
                    None => {
                        inputs.planner.fail_action(action.id, inputs.now);
                        Some(Decision::wait("no way through to the item", 0.3))
                    }
                }
            }
            ActionKind::Rest => {
                inputs.planner.complete_action(action.id, inputs.now);
                Some(Decision::wait(action.description.clone(), 0.8))
            }
            ActionKind::Reflect => {
                inputs.planner.complete_action(action.id, inputs.now);
                Some(Decision::reflect(action.description.clone(), 0.8))
            }
            ActionKind::Wait => {
                inputs.planner.complete_action(action.id, inputs.now);
                Some(Decision::wait(action.description.clone(), 0.8))
            }
        }
    }

    fn explore_step(&self, inputs: &DecisionInputs<'_>, why: &str) -> Decision {
        match open_step(inputs.maze, inputs.position) {
            Some(direction) => Decision::step(
                direction,
                format!("{why} (exploring {direction})"),
                self.config.explore_confidence,
            ),
            None => Decision::wait("nowhere open to explore", 0.3),
        }
    }

    // -----------------------------------------------------------------------
    // Cascade step 3: reactive decision
    // -----------------------------------------------------------------------

    async fn reactive_decision(&self, inputs: &mut DecisionInputs<'_>) -> Decision {
        let surroundings = classify_surroundings(inputs.maze, inputs.position);
        let open: Vec<String> = Direction::ALL
            .iter()
            .filter(|d| inputs.maze.is_open(inputs.position, **d))
            .map(ToString::to_string)
            .collect();

        let recent: Vec<String> = inputs
            .stream
            .all()
            .iter()
            .rev()
            .take(self.config.recent_memories_in_prompt)
            .map(|r| r.description.clone())
            .collect();
        let stress_modifier = inputs.survival.snapshot().stress_modifier();
        let relevant: Vec<String> = inputs
            .retrieval
            .retrieve(
                inputs.stream,
                &inputs.goal_text,
                self.config.recent_memories_in_prompt,
                stress_modifier,
                inputs.now,
            )
            .await
            .into_iter()
            .map(|r| r.record.description)
            .collect();

        let rendered = prompt::render_template(
            prompt::DECISION,
            &[
                ("position", &inputs.position.to_string()),
                ("surroundings", &surroundings.to_string()),
                ("open_directions", &open.join(", ")),
                ("goal", &inputs.goal_text),
                ("recent_memories", &prompt::render_memory_lines(&recent)),
                ("relevant_memories", &prompt::render_memory_lines(&relevant)),
            ],
        );

        let fallback = || self.heuristic_navigate(inputs.maze, inputs.position, inputs.goal);
        let (decision, _path) = generate_or_fallback(
            self.llm.as_ref(),
            "reactive_decision",
            rendered,
            GenerationOptions::structured(80),
            parse_decision_response,
            fallback,
        )
        .await;

        // The model may name a walled-off direction; sanity-check it.
        if let (DecisionAction::Move, Some(direction)) = (decision.action, decision.direction) {
            if !inputs.maze.is_open(inputs.position, direction) {
                debug!(%direction, "model chose a blocked direction, re-deciding heuristically");
                return self.heuristic_navigate(inputs.maze, inputs.position, inputs.goal);
            }
        }
        decision
    }

    /// Deterministic navigation: best open direction by progress toward
    /// the goal, else any open direction, else wait.
    fn heuristic_navigate(
        &self,
        maze: &dyn MazeAccessor,
        position: GridPos,
        goal: Option<GridPos>,
    ) -> Decision {
        if let Some(goal) = goal {
            if let Some(direction) = improving_step(maze, position, goal) {
                return Decision::step(
                    direction,
                    format!("heading {direction} toward the goal at {goal}"),
                    self.config.heuristic_move_confidence,
                );
            }
        }
        match open_step(maze, position) {
            Some(direction) => Decision::step(
                direction,
                format!("no clear route to a goal; exploring {direction}"),
                self.config.explore_confidence,
            ),
            None => Decision::wait("every direction is blocked", 0.3),
        }
    }
}

// ---------------------------------------------------------------------------
// Pathing helpers & parsing
// ---------------------------------------------------------------------------

/// The open direction that most reduces distance to `target`, if any
/// strictly does.
fn improving_step(maze: &dyn MazeAccessor, from: GridPos, target: GridPos) -> Option<Direction> {
    let current = from.distance(&target);
    Direction::ALL
        .iter()
        .copied()
        .filter(|d| maze.is_open(from, *d))
        .map(|d| (d, from.step(d).distance(&target)))
        .filter(|(_, dist)| *dist < current)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(d, _)| d)
}

/// Any open direction, preferring the one leading farthest from the
/// entrance — a cheap bias toward unexplored ground.
fn open_step(maze: &dyn MazeAccessor, from: GridPos) -> Option<Direction> {
    let entrance = maze.entrance();
    Direction::ALL
        .iter()
        .copied()
        .filter(|d| maze.is_open(from, *d))
        .max_by(|a, b| {
            let da = from.step(*a).distance(&entrance);
            let db = from.step(*b).distance(&entrance);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Parse `ACTION: MOVE <dir> | WAIT` plus a `REASONING:` line.
fn parse_decision_response(text: &str) -> Option<Decision> {
    let mut action_line = None;
    let mut reasoning = None;
    for line in text.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("ACTION:") {
            action_line = Some(trimmed[7..].trim().to_string());
        } else if upper.starts_with("REASONING:") {
            reasoning = Some(trimmed[10..].trim().to_string());
        }
    }
    let action_line = action_line?;
    let reasoning = reasoning.unwrap_or_else(|| "model decision".to_string());

    let upper = action_line.to_ascii_uppercase();
    if upper.starts_with("WAIT") {
        return Some(Decision::wait(reasoning, 0.8));
    }
    if let Some(rest) = upper.strip_prefix("MOVE") {
        let direction = Direction::parse(rest)?;
        return Some(Decision::step(direction, reasoning, 0.8));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlanningConfig, RetrievalConfig};
    use crate::language::NullLanguageModel;
    use crate::planning::PlanContext;
    use crate::types::{ItemKind, ItemSighting, NeedKind};
    use crate::world::{FixedSurvival, OpenGrid, StaticItems, SurvivalSnapshot, UrgentNeed};

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    fn grid() -> OpenGrid {
        OpenGrid {
            width: 10,
            height: 5,
            entrance: GridPos::new(0, 2),
            exit: GridPos::new(8, 2),
        }
    }

    fn maker() -> DecisionMaker {
        DecisionMaker::new(DecisionConfig::default(), Arc::new(NullLanguageModel))
    }

    struct Fixture {
        stream: MemoryStream,
        planner: PlanningSystem,
        retrieval: RetrievalEngine,
        survival: FixedSurvival,
        maze: OpenGrid,
        items: StaticItems,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                stream: MemoryStream::with_capacity(50),
                planner: PlanningSystem::new(
                    PlanningConfig::default(),
                    Arc::new(NullLanguageModel),
                ),
                retrieval: RetrievalEngine::new(RetrievalConfig::default(), None),
                survival: FixedSurvival::default(),
                maze: grid(),
                items: StaticItems::default(),
            }
        }

        fn inputs(&mut self, position: GridPos, now: SimTimestamp) -> DecisionInputs<'_> {
            DecisionInputs {
                stream: &mut self.stream,
                planner: &mut self.planner,
                retrieval: &self.retrieval,
                survival: &self.survival,
                maze: &self.maze,
                items: &self.items,
                position,
                goal: Some(GridPos::new(8, 2)),
                goal_text: "find the exit of the maze".to_string(),
                now,
            }
        }
    }

    #[tokio::test]
    async fn heuristic_reactive_decision_moves_east_toward_exit() {
        // No language model, position (2,2), exit at (8,2), east open:
        // the fallback picks east with the configured 0.7 confidence.
        let mut fixture = Fixture::new();
        let mut maker = maker();
        let decision = maker.decide(&mut fixture.inputs(GridPos::new(2, 2), ts(0))).await;
        assert_eq!(decision.action, DecisionAction::Move);
        assert_eq!(decision.direction, Some(Direction::East));
        assert!((decision.confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn interval_short_circuits_to_wait() {
        let mut fixture = Fixture::new();
        let mut maker = maker();
        let first = maker.decide(&mut fixture.inputs(GridPos::new(2, 2), ts(0))).await;
        assert_eq!(first.action, DecisionAction::Move);

        let second = maker.decide(&mut fixture.inputs(GridPos::new(2, 2), ts(1))).await;
        assert_eq!(second.action, DecisionAction::Wait);

        // Past the 3-second interval decisions resume.
        let third = maker.decide(&mut fixture.inputs(GridPos::new(2, 2), ts(5))).await;
        assert_eq!(third.action, DecisionAction::Move);
    }

    #[tokio::test]
    async fn critical_hunger_overrides_unrelated_plan() {
        let mut fixture = Fixture::new();
        fixture.survival = FixedSurvival {
            snapshot: SurvivalSnapshot {
                hunger: 15.0,
                ..SurvivalSnapshot::FULL
            },
            urgent: Some(UrgentNeed {
                kind: NeedKind::Hunger,
                level: 15.0,
            }),
        };
        fixture.items = StaticItems(vec![ItemSighting {
            kind: ItemKind::Food,
            pos: GridPos::new(5, 2),
        }]);
        // An unrelated exploration plan is active, first hour decomposed.
        let ctx = PlanContext {
            exploration_progress: 0.1,
            ..PlanContext::default()
        };
        fixture
            .planner
            .replan(ReplanReason::NoActivePlan, &ctx, ts(0))
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut maker = DecisionMaker::new(DecisionConfig::default(), Arc::new(NullLanguageModel))
            .with_replan_channel(tx);

        let decision = maker.decide(&mut fixture.inputs(GridPos::new(2, 2), ts(0))).await;
        assert_eq!(decision.action, DecisionAction::Move);
        assert_eq!(decision.direction, Some(Direction::East));
        assert!(decision.reasoning.contains("hunger"));
        // The override fires a re-plan request without waiting on it.
        assert_eq!(
            rx.try_recv().ok(),
            Some(ReplanReason::ResourceCritical(NeedKind::Hunger))
        );
    }

    #[tokio::test]
    async fn plan_move_action_steps_toward_target_and_completes_on_arrival() {
        let mut fixture = Fixture::new();
        let ctx = PlanContext {
            exploration_progress: 0.9,
            exit: Some(GridPos::new(8, 2)),
            ..PlanContext::default()
        };
        fixture
            .planner
            .replan(ReplanReason::NoActivePlan, &ctx, ts(0))
            .await;

        let mut maker = maker();
        // Exit-seeking plan: move action targets (8,2), so from (6,2) go east.
        let decision = maker.decide(&mut fixture.inputs(GridPos::new(6, 2), ts(0))).await;
        assert_eq!(decision.action, DecisionAction::Move);
        assert_eq!(decision.direction, Some(Direction::East));

        // On arrival the action completes and the decision is a wait.
        let decision = maker.decide(&mut fixture.inputs(GridPos::new(8, 2), ts(10))).await;
        assert_eq!(decision.action, DecisionAction::Wait);
        assert!(decision.reasoning.contains("arrived"));
        let plan = fixture.planner.current_plan().expect("plan");
        assert!(plan.hours[0]
            .actions
            .iter()
            .any(|a| a.status == crate::planning::PlanStatus::Completed));
    }

    #[tokio::test]
    async fn boxed_in_character_waits() {
        struct SealedBox;
        impl MazeAccessor for SealedBox {
            fn bounds(&self) -> (i32, i32) {
                (1, 1)
            }
            fn walls(&self, _pos: GridPos) -> crate::world::WallFlags {
                crate::world::WallFlags {
                    north: true,
                    east: true,
                    south: true,
                    west: true,
                }
            }
            fn entrance(&self) -> GridPos {
                GridPos::new(0, 0)
            }
            fn exit(&self) -> GridPos {
                GridPos::new(0, 0)
            }
        }

        let mut fixture = Fixture::new();
        let sealed = SealedBox;
        let mut inputs = fixture.inputs(GridPos::new(0, 0), ts(0));
        inputs.maze = &sealed;
        inputs.goal = Some(GridPos::new(5, 5));
        let mut maker = maker();
        let decision = maker.decide(&mut inputs).await;
        assert_eq!(decision.action, DecisionAction::Wait);
    }

    #[test]
    fn parses_structured_move_response() {
        let decision = parse_decision_response(
            "ACTION: MOVE east\nREASONING: the exit is that way\n",
        )
        .expect("decision");
        assert_eq!(decision.action, DecisionAction::Move);
        assert_eq!(decision.direction, Some(Direction::East));
        assert_eq!(decision.reasoning, "the exit is that way");

        let wait = parse_decision_response("ACTION: WAIT\nREASONING: unsure").expect("decision");
        assert_eq!(wait.action, DecisionAction::Wait);

        assert!(parse_decision_response("MOVE east").is_none());
        assert!(parse_decision_response("ACTION: MOVE up\nREASONING: x").is_none());
    }

    #[test]
    fn improving_step_requires_strict_progress() {
        let maze = grid();
        // Straight line toward the exit.
        assert_eq!(
            improving_step(&maze, GridPos::new(2, 2), GridPos::new(8, 2)),
            Some(Direction::East)
        );
        // Standing on the target: nothing improves.
        assert_eq!(improving_step(&maze, GridPos::new(8, 2), GridPos::new(8, 2)), None);
    }
}
