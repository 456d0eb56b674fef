//! The three-level plan hierarchy and its status state machine.
//!
//! Daily plans own hourly plans own action plans. Nodes are created
//! top-down during decomposition and mutated bottom-up on completion:
//! completing the last child of a node completes the node, within the
//! same call chain.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{GridPos, ItemKind, PlanId, SimTimestamp, TICKS_PER_HOUR, TICKS_PER_MINUTE};

/// Shared status state machine:
/// `Pending → InProgress → {Completed, Abandoned, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Not started.
    Pending,
    /// Currently being executed.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Dropped by a re-plan.
    Abandoned,
    /// Execution failed.
    Failed,
}

impl PlanStatus {
    /// Whether this status is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned | Self::Failed)
    }
}

/// Priority of a daily goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanPriority {
    /// Survival is at stake.
    Critical,
    /// Important, do soon.
    High,
    /// Ordinary.
    Medium,
    /// Opportunistic.
    Low,
}

impl PlanPriority {
    /// Parse from a case-insensitive name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// What an action plan asks the character to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Move toward a target position.
    Move,
    /// Wander into unvisited territory.
    Explore,
    /// Consume an item at the target.
    ConsumeItem,
    /// Head for the nearest item of a kind.
    SeekItem,
    /// Recover energy in place.
    Rest,
    /// Pause to reflect.
    Reflect,
    /// Do nothing this quantum.
    Wait,
}

impl ActionKind {
    /// Parse from a case-insensitive snake_case name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" => Some(Self::Move),
            "explore" => Some(Self::Explore),
            "consume_item" | "consume" => Some(Self::ConsumeItem),
            "seek_item" | "seek" => Some(Self::SeekItem),
            "rest" => Some(Self::Rest),
            "reflect" => Some(Self::Reflect),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Explore => write!(f, "explore"),
            Self::ConsumeItem => write!(f, "consume_item"),
            Self::SeekItem => write!(f, "seek_item"),
            Self::Rest => write!(f, "rest"),
            Self::Reflect => write!(f, "reflect"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

// ---------------------------------------------------------------------------
// Action plan
// ---------------------------------------------------------------------------

/// One planning quantum of concrete behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Unique identifier.
    pub id: PlanId,
    /// Owning hourly plan.
    pub parent: PlanId,
    /// Scheduled start.
    pub start: SimTimestamp,
    /// Duration in simulated minutes (one planning quantum).
    pub duration_minutes: u32,
    /// What to do.
    pub description: String,
    /// Action type.
    pub kind: ActionKind,
    /// Target position, for move-like actions.
    pub target_pos: Option<GridPos>,
    /// Target item kind, for seek/consume actions.
    pub target_item: Option<ItemKind>,
    /// Current status.
    pub status: PlanStatus,
    /// When the action completed, if it did.
    pub completed_at: Option<SimTimestamp>,
}

impl ActionPlan {
    /// Create a pending action.
    #[must_use]
    pub fn new(
        parent: PlanId,
        start: SimTimestamp,
        duration_minutes: u32,
        kind: ActionKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            parent,
            start,
            duration_minutes,
            description: description.into(),
            kind,
            target_pos: None,
            target_item: None,
            status: PlanStatus::Pending,
            completed_at: None,
        }
    }

    /// Attach a target position.
    #[must_use]
    pub fn with_target_pos(mut self, pos: GridPos) -> Self {
        self.target_pos = Some(pos);
        self
    }

    /// Attach a target item kind.
    #[must_use]
    pub fn with_target_item(mut self, kind: ItemKind) -> Self {
        self.target_item = Some(kind);
        self
    }

    /// Whether an in-progress action has run strictly longer than
    /// `factor ×` its allotted duration.
    #[must_use]
    pub fn overrun(&self, now: SimTimestamp, factor: f32) -> bool {
        self.status == PlanStatus::InProgress
            && now.seconds_since(&self.start)
                > factor * (self.duration_minutes as f32) * TICKS_PER_MINUTE as f32
    }
}

// ---------------------------------------------------------------------------
// Hourly plan
// ---------------------------------------------------------------------------

/// One simulated hour of the day, owning its action quanta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyPlan {
    /// Unique identifier.
    pub id: PlanId,
    /// Owning daily plan.
    pub parent: PlanId,
    /// Scheduled start.
    pub start: SimTimestamp,
    /// What this hour is for.
    pub objective: String,
    /// Owned action quanta, in execution order.
    pub actions: Vec<ActionPlan>,
    /// Current status.
    pub status: PlanStatus,
}

impl HourlyPlan {
    /// Create a pending hourly plan with no actions yet.
    #[must_use]
    pub fn new(parent: PlanId, start: SimTimestamp, objective: impl Into<String>) -> Self {
        Self {
            id: PlanId::new(),
            parent,
            start,
            objective: objective.into(),
            actions: Vec::new(),
            status: PlanStatus::Pending,
        }
    }

    /// End of this hour's window.
    #[must_use]
    pub fn end_tick(&self) -> u64 {
        self.start.tick + TICKS_PER_HOUR
    }

    fn refresh_status(&mut self) {
        if !self.actions.is_empty() && self.actions.iter().all(|a| a.status == PlanStatus::Completed)
        {
            self.status = PlanStatus::Completed;
        }
    }
}

// ---------------------------------------------------------------------------
// Daily plan
// ---------------------------------------------------------------------------

/// The day-level goal, owning the whole hierarchy below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPlan {
    /// Unique identifier.
    pub id: PlanId,
    /// When the plan was made.
    pub created_at: SimTimestamp,
    /// Natural-language goal.
    pub goal: String,
    /// Why this goal was chosen.
    pub reasoning: String,
    /// Goal priority.
    pub priority: PlanPriority,
    /// Owned hourly plans, in order.
    pub hours: Vec<HourlyPlan>,
    /// Current status.
    pub status: PlanStatus,
    /// Why the plan was abandoned, when it was.
    pub abandon_reason: Option<String>,
}

impl DailyPlan {
    /// Create a pending daily plan with no hours yet.
    #[must_use]
    pub fn new(
        goal: impl Into<String>,
        reasoning: impl Into<String>,
        priority: PlanPriority,
        now: SimTimestamp,
    ) -> Self {
        Self {
            id: PlanId::new(),
            created_at: now,
            goal: goal.into(),
            reasoning: reasoning.into(),
            priority,
            hours: Vec::new(),
            status: PlanStatus::Pending,
            abandon_reason: None,
        }
    }

    /// Whether every hour (and therefore the day) ran to completion.
    #[must_use]
    pub fn is_fully_completed(&self) -> bool {
        self.status == PlanStatus::Completed
    }

    /// The first non-terminal action whose start time has arrived,
    /// transitioned to `InProgress`. Also marks the enclosing hour and
    /// the day as in progress on first touch.
    pub fn current_action(&mut self, now: SimTimestamp) -> Option<&mut ActionPlan> {
        if self.status.is_terminal() {
            return None;
        }
        let day_status = &mut self.status;
        for hour in &mut self.hours {
            if hour.status.is_terminal() {
                continue;
            }
            for action in &mut hour.actions {
                if action.status.is_terminal() || action.start.tick > now.tick {
                    continue;
                }
                if action.status == PlanStatus::Pending {
                    action.status = PlanStatus::InProgress;
                }
                if hour.status == PlanStatus::Pending {
                    hour.status = PlanStatus::InProgress;
                }
                if *day_status == PlanStatus::Pending {
                    *day_status = PlanStatus::InProgress;
                }
                return Some(action);
            }
        }
        None
    }

    /// Mark an action completed and cascade completion upward. Unknown
    /// ids are a logged no-op, never an error.
    pub fn complete_action(&mut self, id: PlanId, now: SimTimestamp) {
        self.finish_action(id, PlanStatus::Completed, now);
    }

    /// Mark an action failed. The hierarchy above stays open so the
    /// re-plan monitor can judge what to do.
    pub fn fail_action(&mut self, id: PlanId, now: SimTimestamp) {
        self.finish_action(id, PlanStatus::Failed, now);
    }

    fn finish_action(&mut self, id: PlanId, status: PlanStatus, now: SimTimestamp) {
        let Some(hour) = self
            .hours
            .iter_mut()
            .find(|h| h.actions.iter().any(|a| a.id == id))
        else {
            warn!(%id, "finish_action on unknown plan id");
            return;
        };
        if let Some(action) = hour.actions.iter_mut().find(|a| a.id == id) {
            action.status = status;
            if status == PlanStatus::Completed {
                action.completed_at = Some(now);
            }
        }
        hour.refresh_status();
        if !self.hours.is_empty() && self.hours.iter().all(|h| h.status == PlanStatus::Completed) {
            self.status = PlanStatus::Completed;
        }
    }

    /// Abandon the plan and every non-terminal node under it, recording
    /// the reason.
    pub fn abandon(&mut self, reason: impl Into<String>) {
        self.abandon_reason = Some(reason.into());
        self.status = PlanStatus::Abandoned;
        for hour in &mut self.hours {
            if !hour.status.is_terminal() {
                hour.status = PlanStatus::Abandoned;
            }
            for action in &mut hour.actions {
                if !action.status.is_terminal() {
                    action.status = PlanStatus::Abandoned;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    fn plan_with_two_hours() -> DailyPlan {
        let mut daily = DailyPlan::new("explore", "testing", PlanPriority::Medium, ts(0));
        for h in 0..2u64 {
            let mut hour = HourlyPlan::new(daily.id, ts(h * TICKS_PER_HOUR), format!("hour {h}"));
            for a in 0..2u64 {
                hour.actions.push(ActionPlan::new(
                    hour.id,
                    ts(h * TICKS_PER_HOUR + a * 5 * TICKS_PER_MINUTE),
                    5,
                    ActionKind::Explore,
                    format!("step {a}"),
                ));
            }
            daily.hours.push(hour);
        }
        daily
    }

    #[test]
    fn completion_cascades_bottom_up() {
        let mut daily = plan_with_two_hours();
        let ids: Vec<PlanId> = daily
            .hours
            .iter()
            .flat_map(|h| h.actions.iter().map(|a| a.id))
            .collect();

        // Completing all actions of hour 0 completes hour 0 only.
        daily.complete_action(ids[0], ts(100));
        daily.complete_action(ids[1], ts(200));
        assert_eq!(daily.hours[0].status, PlanStatus::Completed);
        assert_ne!(daily.status, PlanStatus::Completed);

        // Completing the rest completes the day within the same call chain.
        daily.complete_action(ids[2], ts(300));
        daily.complete_action(ids[3], ts(400));
        assert_eq!(daily.hours[1].status, PlanStatus::Completed);
        assert_eq!(daily.status, PlanStatus::Completed);
        assert!(daily.is_fully_completed());
    }

    #[test]
    fn unknown_action_id_is_a_noop() {
        let mut daily = plan_with_two_hours();
        daily.complete_action(PlanId::new(), ts(100));
        assert_eq!(daily.status, PlanStatus::Pending);
    }

    #[test]
    fn current_action_marks_in_progress_chain() {
        let mut daily = plan_with_two_hours();
        let action_id = {
            let action = daily.current_action(ts(10)).expect("action");
            assert_eq!(action.status, PlanStatus::InProgress);
            action.id
        };
        assert_eq!(daily.hours[0].status, PlanStatus::InProgress);
        assert_eq!(daily.status, PlanStatus::InProgress);
        // Same action returned until finished.
        assert_eq!(daily.current_action(ts(20)).map(|a| a.id), Some(action_id));
    }

    #[test]
    fn current_action_skips_future_starts() {
        let mut daily = plan_with_two_hours();
        // At tick 0, only action 0 has started.
        let first = daily.current_action(ts(0)).expect("action").id;
        daily.complete_action(first, ts(1));
        // The next action starts 5 minutes in; nothing is due at tick 2.
        assert!(daily.current_action(ts(2)).is_none());
        assert!(daily.current_action(ts(5 * TICKS_PER_MINUTE)).is_some());
    }

    #[test]
    fn abandon_cascades_and_records_reason() {
        let mut daily = plan_with_two_hours();
        let _ = daily.current_action(ts(0));
        daily.abandon("diverged from route");
        assert_eq!(daily.status, PlanStatus::Abandoned);
        assert_eq!(daily.abandon_reason.as_deref(), Some("diverged from route"));
        assert!(daily
            .hours
            .iter()
            .flat_map(|h| h.actions.iter())
            .all(|a| a.status == PlanStatus::Abandoned));
    }

    #[test]
    fn overrun_is_strictly_greater_than_three_durations() {
        let mut action = ActionPlan::new(PlanId::new(), ts(0), 5, ActionKind::Move, "go");
        action.status = PlanStatus::InProgress;
        let limit = 3 * 5 * TICKS_PER_MINUTE;
        assert!(!action.overrun(ts(limit), 3.0), "exactly 3x is not overrun");
        assert!(action.overrun(ts(limit + 1), 3.0), "just past 3x is overrun");
        // Pending actions never count as overrun.
        action.status = PlanStatus::Pending;
        assert!(!action.overrun(ts(limit * 2), 3.0));
    }
}
