//! Hierarchical planning — goal generation, decomposition, and re-planning.
//!
//! A daily goal decomposes into hourly objectives, which decompose into
//! quantum-sized actions. Generation first asks the language model with a
//! structured prompt and falls back to deterministic keyword templating,
//! so the planner keeps working with no model at all. A re-plan abandons
//! the whole current day (recording why) and rebuilds it, decomposing only
//! the first hour up front to keep latency low.

pub mod hierarchy;

pub use hierarchy::{
    ActionKind, ActionPlan, DailyPlan, HourlyPlan, PlanPriority, PlanStatus,
};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PlanningConfig;
use crate::language::{GenerationOptions, LanguageModel, generate_or_fallback};
use crate::prompt;
use crate::types::{
    GridPos, ItemKind, ItemSighting, NeedKind, PlanId, SimTimestamp, TICKS_PER_HOUR,
};
use crate::world::SurvivalSnapshot;

// ---------------------------------------------------------------------------
// Context & re-plan reasons
// ---------------------------------------------------------------------------

/// Everything the planner may consult, passed in per call — the planner
/// holds no ambient world state of its own.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    /// Character position.
    pub position: GridPos,
    /// Survival levels.
    pub survival: SurvivalSnapshot,
    /// Fraction of the maze explored, in \[0, 1\].
    pub exploration_progress: f32,
    /// Exit position, once discovered.
    pub exit: Option<GridPos>,
    /// Items currently known near the character.
    pub nearby_items: Vec<ItemSighting>,
    /// Short summaries of recent memories, for prompts.
    pub recent_memories: Vec<String>,
}

impl PlanContext {
    fn critical_need(&self, threshold: f32) -> Option<NeedKind> {
        [NeedKind::Hunger, NeedKind::Thirst, NeedKind::Energy]
            .into_iter()
            .map(|kind| (kind, self.survival.level(kind)))
            .filter(|(_, level)| *level < threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(kind, _)| kind)
    }
}

/// How a plan diverged from reality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Distance to the action target grew past the divergence threshold.
    DistanceIncreased,
    /// The item an action needs to consume is no longer there.
    TargetItemGone,
    /// An in-progress action ran far past its allotted duration.
    ActionOverrun,
}

/// Why a re-plan fired. Checked in order; first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplanReason {
    /// A survival resource fell below its critical threshold.
    ResourceCritical(NeedKind),
    /// A cluster of unclaimed items turned up while exploring.
    ItemOpportunity(usize),
    /// The current plan ran to completion.
    PlanCompleted,
    /// There is no live plan at all.
    NoActivePlan,
    /// Execution diverged from the plan.
    Divergence(DivergenceKind),
}

impl std::fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceCritical(kind) => write!(f, "critical {kind}"),
            Self::ItemOpportunity(n) => write!(f, "{n} unclaimed items nearby"),
            Self::PlanCompleted => write!(f, "plan completed"),
            Self::NoActivePlan => write!(f, "no active plan"),
            Self::Divergence(DivergenceKind::DistanceIncreased) => {
                write!(f, "diverging from target")
            }
            Self::Divergence(DivergenceKind::TargetItemGone) => write!(f, "target item vanished"),
            Self::Divergence(DivergenceKind::ActionOverrun) => {
                write!(f, "action overran its window")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Planning system
// ---------------------------------------------------------------------------

/// The planning system for one character.
pub struct PlanningSystem {
    config: PlanningConfig,
    llm: Arc<dyn LanguageModel>,
    current: Option<DailyPlan>,
    /// (action id, last observed distance) for divergence detection.
    last_distance: Option<(PlanId, f32)>,
}

impl PlanningSystem {
    /// Create a new planning system.
    #[must_use]
    pub fn new(config: PlanningConfig, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            llm,
            current: None,
            last_distance: None,
        }
    }

    /// The active daily plan, if any.
    #[must_use]
    pub fn current_plan(&self) -> Option<&DailyPlan> {
        self.current.as_ref()
    }

    // -----------------------------------------------------------------------
    // Generation & decomposition
    // -----------------------------------------------------------------------

    /// Generate and install a fresh daily plan from context.
    pub async fn generate_daily_plan(
        &mut self,
        ctx: &PlanContext,
        now: SimTimestamp,
    ) -> &DailyPlan {
        let plan = self.draft_daily_plan(None, ctx, now).await;
        info!(goal = %plan.goal, priority = %plan.priority, "daily plan generated");
        self.last_distance = None;
        self.current.insert(plan)
    }

    async fn draft_daily_plan(
        &self,
        reason: Option<&ReplanReason>,
        ctx: &PlanContext,
        now: SimTimestamp,
    ) -> DailyPlan {
        let rendered = prompt::render_template(
            prompt::DAILY_PLAN,
            &[
                ("position", &ctx.position.to_string()),
                ("hunger", &format!("{:.0}", ctx.survival.hunger)),
                ("thirst", &format!("{:.0}", ctx.survival.thirst)),
                ("energy", &format!("{:.0}", ctx.survival.energy)),
                ("stress", &format!("{:.0}", ctx.survival.stress)),
                ("exploration_pct", &format!("{:.0}", ctx.exploration_progress * 100.0)),
                ("exit_known", &exit_description(ctx.exit)),
                ("recent_memories", &prompt::render_memory_lines(&ctx.recent_memories)),
            ],
        );
        let ((goal, reasoning, priority), _path) = generate_or_fallback(
            self.llm.as_ref(),
            "daily_plan",
            rendered,
            GenerationOptions::structured(150),
            parse_daily_response,
            || self.heuristic_goal(reason, ctx),
        )
        .await;
        DailyPlan::new(goal, reasoning, priority, now)
    }

    /// Deterministic goal selection, in priority order: crisis resource,
    /// under-explored maze, then the exit.
    fn heuristic_goal(
        &self,
        reason: Option<&ReplanReason>,
        ctx: &PlanContext,
    ) -> (String, String, PlanPriority) {
        if let Some(ReplanReason::ItemOpportunity(n)) = reason {
            return (
                "Gather the supplies spotted nearby".to_string(),
                format!("{n} unclaimed items are within reach"),
                PlanPriority::High,
            );
        }
        if let Some(need) = ctx.critical_need(self.config.critical_resource_threshold) {
            return (
                format!("Secure {need} before anything else"),
                format!(
                    "{need} is below the critical threshold of {:.0}",
                    self.config.critical_resource_threshold
                ),
                PlanPriority::Critical,
            );
        }
        if ctx.exploration_progress < self.config.exploration_goal_fraction {
            return (
                "Explore the maze and map its branches".to_string(),
                format!(
                    "only {:.0}% of the maze is known",
                    ctx.exploration_progress * 100.0
                ),
                PlanPriority::High,
            );
        }
        (
            "Find the exit and leave the maze".to_string(),
            "the maze is well explored; time to leave".to_string(),
            PlanPriority::High,
        )
    }

    /// Fill a daily plan with hourly objectives.
    pub async fn decompose_into_hourly_plans(
        &self,
        daily: &mut DailyPlan,
        ctx: &PlanContext,
        now: SimTimestamp,
    ) {
        let hour_count = self.config.hours_per_daily_plan.max(1);
        let rendered = prompt::render_template(
            prompt::HOURLY_OBJECTIVES,
            &[
                ("goal", &daily.goal),
                ("reasoning", &daily.reasoning),
                ("hour_count", &hour_count.to_string()),
            ],
        );
        let goal = daily.goal.clone();
        let (objectives, _path) = generate_or_fallback(
            self.llm.as_ref(),
            "hourly_objectives",
            rendered,
            GenerationOptions::structured(200),
            |text| {
                let parsed = parse_prefixed(text, "OBJECTIVE:");
                (!parsed.is_empty()).then_some(parsed)
            },
            || heuristic_objectives(&goal, ctx),
        )
        .await;

        daily.hours.clear();
        for (i, objective) in objectives.iter().cycle().take(hour_count).enumerate() {
            let start = SimTimestamp {
                tick: now.tick + i as u64 * TICKS_PER_HOUR,
                real_time: now.real_time,
            };
            daily.hours.push(HourlyPlan::new(daily.id, start, objective.clone()));
        }
    }

    /// Append a single hourly plan to a daily plan.
    pub fn generate_hourly_plan(
        &self,
        daily: &mut DailyPlan,
        objective: impl Into<String>,
        start: SimTimestamp,
    ) -> PlanId {
        let hour = HourlyPlan::new(daily.id, start, objective);
        let id = hour.id;
        daily.hours.push(hour);
        id
    }

    /// Fill an hourly plan with quantum-sized actions.
    pub async fn decompose_into_actions(
        &self,
        hourly: &mut HourlyPlan,
        ctx: &PlanContext,
    ) {
        let quantum = self.config.action_quantum_minutes.max(1);
        let max_actions = (60 / quantum).max(1) as usize;
        let rendered = prompt::render_template(
            prompt::HOURLY_ACTIONS,
            &[
                ("objective", &hourly.objective),
                ("position", &ctx.position.to_string()),
                ("exit_known", &exit_description(ctx.exit)),
                ("quantum", &quantum.to_string()),
                ("max_actions", &max_actions.to_string()),
            ],
        );
        let objective = hourly.objective.clone();
        let (specs, _path) = generate_or_fallback(
            self.llm.as_ref(),
            "hourly_actions",
            rendered,
            GenerationOptions::structured(250),
            |text| {
                let parsed = parse_action_lines(text);
                (!parsed.is_empty()).then_some(parsed)
            },
            || heuristic_actions(&objective, ctx),
        )
        .await;

        hourly.actions.clear();
        for (i, (kind, description)) in specs.into_iter().take(max_actions).enumerate() {
            let start = SimTimestamp {
                tick: hourly.start.tick + i as u64 * u64::from(quantum) * 60,
                real_time: hourly.start.real_time,
            };
            let mut action = ActionPlan::new(hourly.id, start, quantum, kind, description);
            match kind {
                ActionKind::Move => {
                    if let Some(exit) = ctx.exit {
                        action = action.with_target_pos(exit);
                    }
                }
                ActionKind::SeekItem | ActionKind::ConsumeItem => {
                    let wanted = ctx
                        .critical_need(self.config.critical_resource_threshold)
                        .and_then(|need| need.item())
                        .unwrap_or(ItemKind::Food);
                    action = action.with_target_item(wanted);
                    if let Some(sighting) = ctx
                        .nearby_items
                        .iter()
                        .find(|s| s.kind == wanted)
                    {
                        action = action.with_target_pos(sighting.pos);
                    }
                }
                _ => {}
            }
            hourly.actions.push(action);
        }
    }

    /// Append a single action to an hourly plan.
    pub fn generate_action_plan(
        &self,
        hourly: &mut HourlyPlan,
        kind: ActionKind,
        description: impl Into<String>,
        start: SimTimestamp,
    ) -> PlanId {
        let action = ActionPlan::new(
            hourly.id,
            start,
            self.config.action_quantum_minutes.max(1),
            kind,
            description,
        );
        let id = action.id;
        hourly.actions.push(action);
        id
    }

    // -----------------------------------------------------------------------
    // Execution surface
    // -----------------------------------------------------------------------

    /// The action due at `now`, transitioned to in-progress.
    pub fn current_action(&mut self, now: SimTimestamp) -> Option<ActionPlan> {
        self.current
            .as_mut()
            .and_then(|plan| plan.current_action(now).map(|a| a.clone()))
    }

    /// Decompose the in-window hourly plan on demand, so later hours stay
    /// cheap until they actually arrive.
    pub async fn ensure_actions(&mut self, ctx: &PlanContext, now: SimTimestamp) {
        let Some(mut plan) = self.current.take() else {
            return;
        };
        if let Some(hour) = plan.hours.iter_mut().find(|h| {
            !h.status.is_terminal()
                && h.actions.is_empty()
                && h.start.tick <= now.tick
                && now.tick < h.end_tick()
        }) {
            debug!(objective = %hour.objective, "decomposing hourly plan on demand");
            self.decompose_into_actions(hour, ctx).await;
        }
        self.current = Some(plan);
    }

    /// Mark an action completed. Unknown ids and a missing plan are
    /// logged no-ops.
    pub fn complete_action(&mut self, id: PlanId, now: SimTimestamp) {
        match self.current.as_mut() {
            Some(plan) => plan.complete_action(id, now),
            None => warn!(%id, "complete_action with no active plan"),
        }
    }

    /// Mark an action failed. Unknown ids and a missing plan are logged
    /// no-ops.
    pub fn fail_action(&mut self, id: PlanId, now: SimTimestamp) {
        match self.current.as_mut() {
            Some(plan) => plan.fail_action(id, now),
            None => warn!(%id, "fail_action with no active plan"),
        }
    }

    // -----------------------------------------------------------------------
    // Re-planning
    // -----------------------------------------------------------------------

    /// Check all re-plan triggers, first match wins.
    pub fn monitor_for_replanning(
        &mut self,
        ctx: &PlanContext,
        now: SimTimestamp,
    ) -> Option<ReplanReason> {
        // Resource crisis — unless the current plan is already a crisis plan.
        if let Some(need) = ctx.critical_need(self.config.critical_resource_threshold) {
            let already_handling = self
                .current
                .as_ref()
                .is_some_and(|p| p.priority == PlanPriority::Critical && !p.status.is_terminal());
            if !already_handling {
                return Some(ReplanReason::ResourceCritical(need));
            }
        }

        // Item cluster while exploring — unless already gathering.
        let active_action = self
            .current
            .as_mut()
            .and_then(|plan| plan.current_action(now).map(|a| a.clone()));
        if let Some(action) = &active_action {
            if action.kind == ActionKind::Explore {
                let nearby = ctx
                    .nearby_items
                    .iter()
                    .filter(|s| s.pos.distance(&ctx.position) <= self.config.item_cluster_radius)
                    .count();
                if nearby >= self.config.item_cluster_size {
                    return Some(ReplanReason::ItemOpportunity(nearby));
                }
            }
        }

        match self.current.as_ref() {
            Some(plan) if plan.is_fully_completed() => return Some(ReplanReason::PlanCompleted),
            Some(plan) if plan.status.is_terminal() => return Some(ReplanReason::NoActivePlan),
            None => return Some(ReplanReason::NoActivePlan),
            Some(_) => {}
        }

        if let Some(action) = &active_action {
            if let Some(divergence) = self.check_divergence(action, ctx, now) {
                return Some(ReplanReason::Divergence(divergence));
            }
        }
        None
    }

    fn check_divergence(
        &mut self,
        action: &ActionPlan,
        ctx: &PlanContext,
        now: SimTimestamp,
    ) -> Option<DivergenceKind> {
        // (i) Distance to target growing instead of shrinking.
        if let Some(target) = action.target_pos {
            let distance = ctx.position.distance(&target);
            if let Some((last_id, last_distance)) = self.last_distance {
                if last_id == action.id
                    && distance > last_distance * self.config.divergence_threshold
                {
                    self.last_distance = None;
                    return Some(DivergenceKind::DistanceIncreased);
                }
            }
            self.last_distance = Some((action.id, distance));
        }

        // (ii) The item to consume vanished. Only judged once the target
        // tile is inside the character's sighting radius.
        if action.kind == ActionKind::ConsumeItem {
            if let (Some(kind), Some(target)) = (action.target_item, action.target_pos) {
                let target_in_view =
                    ctx.position.distance(&target) <= self.config.item_cluster_radius;
                let still_there = ctx
                    .nearby_items
                    .iter()
                    .any(|s| s.kind == kind && s.pos == target);
                if target_in_view && !still_there {
                    return Some(DivergenceKind::TargetItemGone);
                }
            }
        }

        // (iii) Action running far past its allotted duration.
        if action.overrun(now, self.config.overrun_factor) {
            return Some(DivergenceKind::ActionOverrun);
        }
        None
    }

    /// Abandon the current plan for `reason` and build a fresh one,
    /// decomposing only the first hour and its actions up front. The old
    /// plan is only dropped once the new one exists, so a failed rebuild
    /// would leave the character with the stale plan rather than none.
    pub async fn replan(&mut self, reason: ReplanReason, ctx: &PlanContext, now: SimTimestamp) {
        info!(%reason, "re-planning");
        let mut fresh = self.draft_daily_plan(Some(&reason), ctx, now).await;
        self.decompose_into_hourly_plans(&mut fresh, ctx, now).await;
        if let Some(first_hour) = fresh.hours.first_mut() {
            self.decompose_into_actions(first_hour, ctx).await;
        }

        if let Some(old) = self.current.as_mut() {
            if !old.status.is_terminal() {
                old.abandon(reason.to_string());
            }
        }
        self.last_distance = None;
        self.current = Some(fresh);
    }
}

// ---------------------------------------------------------------------------
// Parsing & heuristics
// ---------------------------------------------------------------------------

fn exit_description(exit: Option<GridPos>) -> String {
    exit.map_or_else(|| "not yet discovered".to_string(), |p| p.to_string())
}

fn parse_prefixed(text: &str, prefix: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(prefix))
        .map(|rest| rest.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `GOAL:` / `REASONING:` / `PRIORITY:` lines.
fn parse_daily_response(text: &str) -> Option<(String, String, PlanPriority)> {
    let goal = parse_prefixed(text, "GOAL:").into_iter().next()?;
    let reasoning = parse_prefixed(text, "REASONING:")
        .into_iter()
        .next()
        .unwrap_or_else(|| "model gave no reasoning".to_string());
    let priority = parse_prefixed(text, "PRIORITY:")
        .into_iter()
        .next()
        .and_then(|p| PlanPriority::parse(&p))
        .unwrap_or(PlanPriority::Medium);
    Some((goal, reasoning, priority))
}

/// Parse `ACTION: <type> | <description>` lines.
fn parse_action_lines(text: &str) -> Vec<(ActionKind, String)> {
    parse_prefixed(text, "ACTION:")
        .into_iter()
        .filter_map(|line| {
            let (kind_str, description) = line.split_once('|')?;
            let kind = ActionKind::parse(kind_str)?;
            let description = description.trim();
            (!description.is_empty()).then(|| (kind, description.to_string()))
        })
        .collect()
}

/// Keyword-templated hourly objectives for a goal. A worn-down character
/// gets a recovery hour slotted in second.
fn heuristic_objectives(goal: &str, ctx: &PlanContext) -> Vec<String> {
    let lower = goal.to_ascii_lowercase();
    let templates: &[&str] = if ["secure", "gather", "food", "water", "hunger", "thirst", "energy"]
        .iter()
        .any(|k| lower.contains(k))
    {
        &[
            "Search the nearby corridors for supplies",
            "Gather and consume whatever turns up",
            "Rest and recover once supplied",
            "Scout onward from the resupply point",
        ]
    } else if lower.contains("exit") || lower.contains("leave") {
        &[
            "Head toward the known exit",
            "Verify the route stays open",
            "Push through to the exit",
            "Keep moving toward the exit",
        ]
    } else {
        &[
            "Push into unexplored branches",
            "Mark dead ends and junctions worth remembering",
            "Circle back to the most promising fork",
            "Chart a route deeper into the maze",
        ]
    };
    let mut objectives: Vec<String> = templates.iter().map(ToString::to_string).collect();
    if ctx.survival.energy < 30.0 && !lower.contains("energy") {
        objectives.insert(1, "Rest and recover before pressing on".to_string());
    }
    objectives
}

/// Keyword-templated actions for an hourly objective.
fn heuristic_actions(objective: &str, ctx: &PlanContext) -> Vec<(ActionKind, String)> {
    let lower = objective.to_ascii_lowercase();
    if ["suppl", "gather", "consume", "search"].iter().any(|k| lower.contains(k)) {
        return vec![
            (ActionKind::SeekItem, "head for the nearest useful item".to_string()),
            (ActionKind::ConsumeItem, "consume the item once reached".to_string()),
            (ActionKind::Rest, "catch a breath after resupplying".to_string()),
        ];
    }
    if lower.contains("rest") || lower.contains("recover") {
        return vec![
            (ActionKind::Rest, "rest in a defensible spot".to_string()),
            (ActionKind::Rest, "keep resting until energy returns".to_string()),
            (ActionKind::Reflect, "mull over the day so far".to_string()),
        ];
    }
    if lower.contains("exit") || lower.contains("push through") || lower.contains("head toward") {
        if ctx.exit.is_some() {
            return vec![
                (ActionKind::Move, "walk toward the exit".to_string()),
                (ActionKind::Move, "keep closing on the exit".to_string()),
                (ActionKind::Move, "final stretch to the exit".to_string()),
            ];
        }
        return vec![
            (ActionKind::Explore, "search for any sign of the exit".to_string()),
            (ActionKind::Explore, "try the least-visited branch".to_string()),
            (ActionKind::Reflect, "piece together where the exit might be".to_string()),
        ];
    }
    vec![
        (ActionKind::Explore, "probe the nearest unexplored branch".to_string()),
        (ActionKind::Explore, "follow it until it ends or forks".to_string()),
        (ActionKind::Explore, "note landmarks along the way".to_string()),
        (ActionKind::Reflect, "take stock of what was found".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::NullLanguageModel;
    use crate::types::TICKS_PER_MINUTE;

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    fn system() -> PlanningSystem {
        PlanningSystem::new(PlanningConfig::default(), Arc::new(NullLanguageModel))
    }

    fn healthy_ctx() -> PlanContext {
        PlanContext {
            exploration_progress: 0.8,
            exit: Some(GridPos::new(8, 2)),
            ..PlanContext::default()
        }
    }

    #[tokio::test]
    async fn heuristic_goal_prefers_crisis_over_exploration() {
        let mut system = system();
        let ctx = PlanContext {
            survival: SurvivalSnapshot {
                hunger: 10.0,
                ..SurvivalSnapshot::FULL
            },
            exploration_progress: 0.1,
            ..PlanContext::default()
        };
        let plan = system.generate_daily_plan(&ctx, ts(0)).await;
        assert!(plan.goal.contains("hunger"));
        assert_eq!(plan.priority, PlanPriority::Critical);
    }

    #[tokio::test]
    async fn heuristic_goal_explores_then_seeks_exit() {
        let mut system = system();
        let exploring = PlanContext {
            exploration_progress: 0.2,
            ..PlanContext::default()
        };
        let plan = system.generate_daily_plan(&exploring, ts(0)).await;
        assert!(plan.goal.to_ascii_lowercase().contains("explore"));

        let explored = healthy_ctx();
        let plan = system.generate_daily_plan(&explored, ts(0)).await;
        assert!(plan.goal.to_ascii_lowercase().contains("exit"));
    }

    #[tokio::test]
    async fn decomposition_builds_hours_then_actions() {
        let mut system = system();
        let ctx = healthy_ctx();
        system.generate_daily_plan(&ctx, ts(0)).await;
        let mut plan = system.current_plan().expect("plan").clone();

        system.decompose_into_hourly_plans(&mut plan, &ctx, ts(0)).await;
        assert_eq!(plan.hours.len(), PlanningConfig::default().hours_per_daily_plan);
        assert_eq!(plan.hours[1].start.tick, TICKS_PER_HOUR);

        system.decompose_into_actions(&mut plan.hours[0], &ctx).await;
        let actions = &plan.hours[0].actions;
        assert!(!actions.is_empty());
        // Exit known and goal is exit-seeking: move actions target the exit.
        assert!(actions.iter().any(|a| a.kind == ActionKind::Move));
        assert!(actions
            .iter()
            .filter(|a| a.kind == ActionKind::Move)
            .all(|a| a.target_pos == Some(GridPos::new(8, 2))));
        // Actions are laid out one quantum apart.
        assert_eq!(actions[1].start.tick - actions[0].start.tick, 5 * TICKS_PER_MINUTE);
    }

    #[tokio::test]
    async fn monitor_reports_no_active_plan_first() {
        let mut system = system();
        let reason = system.monitor_for_replanning(&healthy_ctx(), ts(0));
        assert_eq!(reason, Some(ReplanReason::NoActivePlan));
    }

    #[tokio::test]
    async fn monitor_reports_critical_resource() {
        let mut system = system();
        system.generate_daily_plan(&healthy_ctx(), ts(0)).await;
        let starving = PlanContext {
            survival: SurvivalSnapshot {
                thirst: 5.0,
                ..SurvivalSnapshot::FULL
            },
            ..healthy_ctx()
        };
        assert_eq!(
            system.monitor_for_replanning(&starving, ts(1)),
            Some(ReplanReason::ResourceCritical(NeedKind::Thirst))
        );

        // Once a critical-priority plan is in place the trigger quiets down.
        system.replan(ReplanReason::ResourceCritical(NeedKind::Thirst), &starving, ts(2)).await;
        assert_eq!(system.current_plan().map(|p| p.priority), Some(PlanPriority::Critical));
        assert_ne!(
            system.monitor_for_replanning(&starving, ts(3)),
            Some(ReplanReason::ResourceCritical(NeedKind::Thirst))
        );
    }

    #[tokio::test]
    async fn overrun_divergence_fires_just_past_three_durations() {
        let mut system = system();
        let ctx = PlanContext {
            exploration_progress: 0.2,
            ..PlanContext::default()
        };
        system.generate_daily_plan(&ctx, ts(0)).await;
        let mut plan = system.current_plan().expect("plan").clone();
        system.decompose_into_hourly_plans(&mut plan, &ctx, ts(0)).await;
        system.decompose_into_actions(&mut plan.hours[0], &ctx).await;
        system.current = Some(plan);

        // Start the first action.
        let action = system.current_action(ts(0)).expect("action");
        let limit = u64::from(action.duration_minutes) * TICKS_PER_MINUTE * 3;

        assert_eq!(system.monitor_for_replanning(&ctx, ts(limit)), None);
        assert_eq!(
            system.monitor_for_replanning(&ctx, ts(limit + 1)),
            Some(ReplanReason::Divergence(DivergenceKind::ActionOverrun))
        );
    }

    #[tokio::test]
    async fn replan_abandons_with_reason_and_rebuilds_first_hour() {
        let mut system = system();
        let ctx = healthy_ctx();
        system.generate_daily_plan(&ctx, ts(0)).await;
        let old_id = system.current_plan().expect("plan").id;

        system
            .replan(ReplanReason::Divergence(DivergenceKind::ActionOverrun), &ctx, ts(100))
            .await;
        let plan = system.current_plan().expect("plan");
        assert_ne!(plan.id, old_id);
        assert!(!plan.hours.is_empty());
        assert!(!plan.hours[0].actions.is_empty(), "first hour decomposed eagerly");
        assert!(plan.hours[1..].iter().all(|h| h.actions.is_empty()), "later hours stay lazy");
    }

    #[tokio::test]
    async fn ensure_actions_decomposes_in_window_hour() {
        let mut system = system();
        let ctx = healthy_ctx();
        system.generate_daily_plan(&ctx, ts(0)).await;
        let mut plan = system.current_plan().expect("plan").clone();
        system.decompose_into_hourly_plans(&mut plan, &ctx, ts(0)).await;
        system.current = Some(plan);

        assert!(system.current_plan().expect("plan").hours[0].actions.is_empty());
        system.ensure_actions(&ctx, ts(10)).await;
        assert!(!system.current_plan().expect("plan").hours[0].actions.is_empty());
    }

    #[test]
    fn action_line_parser_accepts_type_and_description() {
        let text = "ACTION: move | head north\nACTION: seek_item | find food\nACTION: bogus | x\nnot a line";
        let parsed = parse_action_lines(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, ActionKind::Move);
        assert_eq!(parsed[1].0, ActionKind::SeekItem);
    }

    #[test]
    fn daily_parser_defaults_missing_fields() {
        let parsed = parse_daily_response("GOAL: leave the maze\n").expect("goal");
        assert_eq!(parsed.0, "leave the maze");
        assert_eq!(parsed.2, PlanPriority::Medium);
        assert!(parse_daily_response("no structured lines").is_none());
    }
}
