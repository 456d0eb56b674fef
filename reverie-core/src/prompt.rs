//! Prompt templates for cognitive LLM operations.
//!
//! Every prompt is a testable artifact with a fixed `{placeholder}`
//! vocabulary; the components render them with [`render_template`] and
//! parse the structured line-oriented responses themselves.

/// Daily plan generation.
pub const DAILY_PLAN: &str = r"You are the planning mind of a character trapped in a maze.

Current state:
- Position: {position}
- Hunger: {hunger}/100, Thirst: {thirst}/100, Energy: {energy}/100, Stress: {stress}/100
- Maze explored: {exploration_pct}%
- Known exit: {exit_known}

Recent memories:
{recent_memories}

Decide the single most important goal for the coming day.
Respond with exactly three lines:
GOAL: <one sentence goal>
REASONING: <one sentence why>
PRIORITY: <critical|high|medium|low>";

/// Hourly objective decomposition.
pub const HOURLY_OBJECTIVES: &str = r"You are decomposing a day-level goal into hour-sized objectives.

Goal: {goal}
Reasoning: {reasoning}
Hours to fill: {hour_count}

Respond with one line per hour, in order:
OBJECTIVE: <one sentence objective>";

/// Action decomposition for one hour.
pub const HOURLY_ACTIONS: &str = r"You are decomposing an hour objective into concrete {quantum}-minute actions.

Objective: {objective}
Position: {position}
Known exit: {exit_known}

Allowed action types: move, explore, consume_item, seek_item, rest, reflect, wait.
Respond with one line per action, at most {max_actions}:
ACTION: <type> | <one sentence description>";

/// Open-ended reflection questions over recent memories.
pub const REFLECTION_QUESTIONS: &str = r"You are the inner voice of a character reviewing recent experiences.

Recent notable memories:
{memories}

What are the {question_count} most revealing questions you could ask about
these experiences? Respond with one line per question:
QUESTION: <question>";

/// Answer synthesis for a single reflection question.
pub const REFLECTION_ANSWER: &str = r"You are the inner voice of a character thinking in a quiet moment.

Question: {question}

Evidence from memory, most relevant first:
{memories}

Answer the question as a single concise insight grounded in the evidence.
Respond with exactly one line:
INSIGHT: <one or two sentence insight>";

/// Meta-reflection over a batch of level-1 insights.
pub const META_REFLECTION: &str = r"You are the inner voice of a character stepping back to see the bigger picture.

Recent insights:
{insights}

What single higher-level conclusion ties these together?
Respond with exactly one line:
INSIGHT: <one or two sentence conclusion>";

/// Reactive decision prompt.
pub const DECISION: &str = r"You are a character navigating a maze, deciding your next step.

You are standing at {position} in {surroundings}.
Open directions: {open_directions}.
Goal: {goal}

Recent memories:
{recent_memories}

Relevant memories:
{relevant_memories}

Respond with exactly two lines:
ACTION: MOVE <north|south|east|west> or WAIT
REASONING: <one sentence>";

/// Simple `{key}` template interpolation.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

/// Render a memory list as a bulleted block, or a placeholder when empty.
#[must_use]
pub fn render_memory_lines(descriptions: &[String]) -> String {
    if descriptions.is_empty() {
        return "- (nothing notable)".to_string();
    }
    descriptions
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}
