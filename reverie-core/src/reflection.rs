//! Reflection — distilling memories into higher-level insights.
//!
//! Two trigger paths are checked every tick: the primary importance-sum
//! trigger (new observation/reflection importance accumulates until a
//! threshold) and a time-based fallback. A fired trigger produces a
//! [`ReflectionJob`] that runs to completion over a snapshot of the
//! stream — typically on a background task — and whose outcome is merged
//! back with [`ReflectionEngine::absorb`]. The job never touches shared
//! state, which is what lets a slow or failing reflection leave the
//! decision loop untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ReflectionConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::language::{GenerationOptions, GenerationPath, LanguageModel, generate_or_fallback};
use crate::memory::{MemoryKind, MemoryRecord, MemoryStream, derived_from_tag};
use crate::prompt;
use crate::retrieval::scoring;
use crate::types::{MemoryId, ReflectionId, SimTimestamp};

/// Tag applied to memories that have been consumed by a reflection pass.
pub const REFLECTED_TAG: &str = "reflected";

/// The three fixed questions used when no language model is configured.
pub const HEURISTIC_QUESTIONS: [&str; 3] = [
    "What patterns keep repeating in my recent experiences?",
    "What have I learned that should change how I act?",
    "What strategies have worked or failed so far?",
];

const MODEL_CONFIDENCE: f32 = 0.8;
const HEURISTIC_CONFIDENCE: f32 = 0.6;

// ---------------------------------------------------------------------------
// Reflection tree
// ---------------------------------------------------------------------------

/// Thematic category of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReflectionCategory {
    /// About what to do next.
    Strategy,
    /// About recurring structure in experience.
    Pattern,
    /// About the character's own state.
    Emotional,
    /// About acquired knowledge.
    Learning,
    /// About other agents.
    Social,
    /// Synthesized from other reflections.
    Meta,
}

/// A synthesized insight node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionNode {
    /// Unique identifier.
    pub id: ReflectionId,
    /// The insight text.
    pub text: String,
    /// Tree level: 1 = from observations, 2 = meta, ≥3 = higher order.
    pub level: u8,
    /// Memory records this insight was derived from.
    pub source_ids: Vec<MemoryId>,
    /// Significance on the shared 1-10 scale.
    pub importance: u8,
    /// Thematic category.
    pub category: ReflectionCategory,
    /// How much to trust this insight, in \[0, 1\].
    pub confidence: f32,
    /// The question that prompted it, if any.
    pub question: Option<String>,
    /// When it was synthesized.
    pub created_at: SimTimestamp,
}

/// Per-level aggregate of reflection nodes for one character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectionTree {
    levels: BTreeMap<u8, Vec<ReflectionNode>>,
}

impl ReflectionTree {
    /// Append a node at its level.
    pub fn add(&mut self, node: ReflectionNode) {
        self.levels.entry(node.level).or_default().push(node);
    }

    /// Nodes at one level, oldest first.
    #[must_use]
    pub fn at_level(&self, level: u8) -> &[ReflectionNode] {
        self.levels.get(&level).map_or(&[], Vec::as_slice)
    }

    /// Total node count across all levels.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    /// Deepest level observed so far (0 when empty).
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.levels.keys().copied().max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Why a reflection fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionTrigger {
    /// The running importance sum crossed its threshold.
    ImportanceSum,
    /// Enough memories and enough elapsed time without a sum trigger.
    Elapsed,
}

// ---------------------------------------------------------------------------
// Job & outcome
// ---------------------------------------------------------------------------

/// Everything a reflection pass needs, detached from the engine so it can
/// run on a background task without borrowing shared state.
pub struct ReflectionJob {
    config: ReflectionConfig,
    retrieval: RetrievalConfig,
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    snapshot: Vec<MemoryRecord>,
    trigger: ReflectionTrigger,
    now: SimTimestamp,
}

/// A synthesized insight waiting to be merged into the stream and tree.
#[derive(Debug, Clone)]
pub struct InsightDraft {
    /// The originating question, if the enhanced path produced it.
    pub question: Option<String>,
    /// Insight text.
    pub text: String,
    /// Contributing memory ids.
    pub sources: Vec<MemoryId>,
    /// Derived importance.
    pub importance: u8,
    /// Thematic category.
    pub category: ReflectionCategory,
    /// Confidence, lower on the heuristic path.
    pub confidence: f32,
}

/// Result of a reflection pass, produced off to the side and merged later.
#[derive(Debug, Clone, Default)]
pub struct ReflectionOutcome {
    /// Level-1 insights in synthesis order.
    pub insights: Vec<InsightDraft>,
    /// Level-2 meta insight text, when enough level-1 nodes accumulated.
    pub meta_text: Option<String>,
}

impl ReflectionOutcome {
    /// Whether the pass produced anything worth merging.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty() && self.meta_text.is_none()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The reflection engine: trigger bookkeeping, job preparation, and merge.
pub struct ReflectionEngine {
    config: ReflectionConfig,
    retrieval: RetrievalConfig,
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    tree: ReflectionTree,
    importance_sum: f32,
    last_reflection: Option<SimTimestamp>,
}

impl ReflectionEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new(
        config: ReflectionConfig,
        retrieval: RetrievalConfig,
        llm: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            config,
            retrieval,
            llm,
            embedder,
            tree: ReflectionTree::default(),
            importance_sum: 0.0,
            last_reflection: None,
        }
    }

    /// The reflection tree built so far.
    #[must_use]
    pub fn tree(&self) -> &ReflectionTree {
        &self.tree
    }

    /// Current running importance sum (exposed for observability).
    #[must_use]
    pub fn importance_sum(&self) -> f32 {
        self.importance_sum
    }

    /// Feed a newly created memory into the importance-sum accumulator.
    /// Plan records do not count toward reflection pressure.
    pub fn note_memory(&mut self, record: &MemoryRecord) {
        if record.kind != MemoryKind::Plan {
            self.importance_sum += f32::from(record.importance);
        }
    }

    /// Check both trigger paths. The importance sum resets to zero exactly
    /// when its trigger fires.
    pub fn check_trigger(
        &mut self,
        stream: &MemoryStream,
        now: SimTimestamp,
    ) -> Option<ReflectionTrigger> {
        if self.importance_sum >= self.config.importance_trigger_sum {
            self.importance_sum = 0.0;
            self.last_reflection = Some(now);
            return Some(ReflectionTrigger::ImportanceSum);
        }

        let last = *self.last_reflection.get_or_insert(now);
        if stream.all().len() >= self.config.min_memories_for_time_trigger
            && now.seconds_since(&last) >= self.config.min_seconds_between as f32
        {
            self.last_reflection = Some(now);
            return Some(ReflectionTrigger::Elapsed);
        }
        None
    }

    /// Snapshot everything a reflection pass needs into a detached job.
    #[must_use]
    pub fn prepare_job(
        &self,
        stream: &MemoryStream,
        trigger: ReflectionTrigger,
        now: SimTimestamp,
    ) -> ReflectionJob {
        ReflectionJob {
            config: self.config.clone(),
            retrieval: self.retrieval.clone(),
            llm: Arc::clone(&self.llm),
            embedder: self.embedder.clone(),
            snapshot: stream.all().to_vec(),
            trigger,
            now,
        }
    }

    /// Merge a finished pass: insights become reflection records and tree
    /// nodes, consumed sources are tagged, and new reflection importance
    /// feeds back into the accumulator.
    pub fn absorb(
        &mut self,
        outcome: ReflectionOutcome,
        stream: &mut MemoryStream,
        now: SimTimestamp,
    ) -> Vec<ReflectionNode> {
        let mut added = Vec::new();
        let mut level1_record_ids = Vec::new();

        for draft in outcome.insights {
            let record = stream.add_reflection(
                draft.text.clone(),
                draft.importance,
                vec![derived_from_tag(&draft.sources)],
                None,
                now,
            );
            self.note_memory(&record);
            level1_record_ids.push(record.id);

            for source in &draft.sources {
                stream.add_tag(*source, REFLECTED_TAG);
                stream.mark_accessed(*source, now);
            }

            let node = ReflectionNode {
                id: ReflectionId::new(),
                text: draft.text,
                level: 1,
                source_ids: draft.sources,
                importance: draft.importance,
                category: draft.category,
                confidence: draft.confidence,
                question: draft.question,
                created_at: now,
            };
            self.tree.add(node.clone());
            added.push(node);
        }

        if let Some(meta_text) = outcome.meta_text {
            let importance = added
                .iter()
                .map(|n| u32::from(n.importance))
                .max()
                .unwrap_or(5)
                .min(9) as u8
                + 1;
            let record = stream.add_reflection(
                meta_text.clone(),
                importance,
                vec![derived_from_tag(&level1_record_ids)],
                None,
                now,
            );
            self.note_memory(&record);

            let node = ReflectionNode {
                id: ReflectionId::new(),
                text: meta_text,
                level: 2,
                source_ids: level1_record_ids,
                importance,
                category: ReflectionCategory::Meta,
                confidence: HEURISTIC_CONFIDENCE,
                question: None,
                created_at: now,
            };
            self.tree.add(node.clone());
            added.push(node);
        }

        info!(nodes = added.len(), depth = self.tree.max_depth(), "reflection absorbed");
        added
    }

    /// Run a full reflection pass inline: prepare, run, and absorb.
    /// Hosts that want the non-blocking path use
    /// [`ReflectionEngine::prepare_job`] / [`ReflectionJob::run`] /
    /// [`ReflectionEngine::absorb`] instead.
    pub async fn reflect_now(
        &mut self,
        stream: &mut MemoryStream,
        trigger: ReflectionTrigger,
        now: SimTimestamp,
    ) -> Vec<ReflectionNode> {
        let job = self.prepare_job(stream, trigger, now);
        let prior_level1 = self.tree.at_level(1).len();
        let outcome = job.run(prior_level1).await;
        self.absorb(outcome, stream, now)
    }
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

impl ReflectionJob {
    /// Run the pass to completion. Never fails: capability trouble routes
    /// through the deterministic heuristics, and an unexpectedly empty
    /// enhanced pass falls back to the legacy single-summary reflection.
    ///
    /// `prior_level1_nodes` is the tree's level-1 count at prepare time,
    /// used to decide whether a meta-reflection is due.
    pub async fn run(self, prior_level1_nodes: usize) -> ReflectionOutcome {
        let focus = self.select_focus();
        if focus.is_empty() {
            debug!(trigger = ?self.trigger, "reflection fired with nothing unreflected");
            return ReflectionOutcome::default();
        }

        let questions = self.generate_questions(&focus).await;

        let mut insights = Vec::new();
        for question in questions {
            let evidence = self.rank_evidence(&question).await;
            if evidence.is_empty() {
                continue;
            }
            insights.push(self.answer_question(question, &evidence).await);
        }

        // Legacy fallback: the enhanced path produced nothing usable.
        if insights.is_empty() {
            insights.push(legacy_insight(&focus));
        }

        let meta_text = if prior_level1_nodes + insights.len() >= self.config.meta_reflection_min_nodes
        {
            Some(self.synthesize_meta(&insights).await)
        } else {
            None
        };

        ReflectionOutcome { insights, meta_text }
    }

    /// Up to N most important observation/reflection records not yet
    /// consumed by a previous pass.
    fn select_focus(&self) -> Vec<MemoryRecord> {
        let mut focus: Vec<MemoryRecord> = self
            .snapshot
            .iter()
            .filter(|r| r.kind != MemoryKind::Plan && !r.has_tag(REFLECTED_TAG))
            .cloned()
            .collect();
        focus.sort_by(|a, b| b.importance.cmp(&a.importance));
        focus.truncate(self.config.max_focus_memories);
        focus
    }

    async fn generate_questions(&self, focus: &[MemoryRecord]) -> Vec<String> {
        let descriptions: Vec<String> = focus.iter().map(|r| r.description.clone()).collect();
        let rendered = prompt::render_template(
            prompt::REFLECTION_QUESTIONS,
            &[
                ("memories", &prompt::render_memory_lines(&descriptions)),
                ("question_count", &self.config.questions_per_reflection.to_string()),
            ],
        );
        let count = self.config.questions_per_reflection;
        let (questions, _path) = generate_or_fallback(
            self.llm.as_ref(),
            "reflection_questions",
            rendered,
            GenerationOptions::structured(200),
            |text| {
                let parsed = parse_prefixed_lines(text, "QUESTION:");
                (!parsed.is_empty()).then_some(parsed)
            },
            || {
                HEURISTIC_QUESTIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            },
        )
        .await;
        questions.into_iter().take(count.max(1)).collect()
    }

    /// Rank the snapshot against one question with the retrieval scoring
    /// math (stress 1.0, no noise, nothing written back).
    async fn rank_evidence(&self, question: &str) -> Vec<MemoryRecord> {
        let query_embedding = match &self.embedder {
            Some(embedder) => embedder.embed(question).await.ok(),
            None => None,
        };
        let weights = &self.retrieval.weights;

        let mut scored: Vec<(f32, &MemoryRecord)> = self
            .snapshot
            .iter()
            .map(|record| {
                let recency = scoring::recency_score(record, &self.now, self.retrieval.decay_factor);
                let importance = scoring::importance_score(record);
                let relevance = query_embedding
                    .as_ref()
                    .and_then(|q| scoring::relevance_score(record, q));
                let score = match relevance {
                    Some(rel) => {
                        weights.recency * recency
                            + weights.importance * importance
                            + weights.relevance * rel
                    }
                    None => {
                        let denom = (weights.recency + weights.importance).max(f32::EPSILON);
                        (weights.recency * recency + weights.importance * importance) / denom
                    }
                };
                (score, record)
            })
            .collect();
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(ordered_float::OrderedFloat(*score)));
        scored
            .into_iter()
            .take(self.config.memories_per_question)
            .map(|(_, r)| r.clone())
            .collect()
    }

    async fn answer_question(&self, question: String, evidence: &[MemoryRecord]) -> InsightDraft {
        let descriptions: Vec<String> = evidence.iter().map(|r| r.description.clone()).collect();
        let rendered = prompt::render_template(
            prompt::REFLECTION_ANSWER,
            &[
                ("question", question.as_str()),
                ("memories", &prompt::render_memory_lines(&descriptions)),
            ],
        );
        let (text, path) = generate_or_fallback(
            self.llm.as_ref(),
            "reflection_answer",
            rendered,
            GenerationOptions::structured(120),
            |raw| parse_prefixed_lines(raw, "INSIGHT:").into_iter().next(),
            || heuristic_insight(&question, evidence),
        )
        .await;

        let sources: Vec<MemoryId> = evidence.iter().map(|r| r.id).collect();
        InsightDraft {
            importance: derived_importance(evidence),
            category: classify_category(&text),
            confidence: match path {
                GenerationPath::Model => MODEL_CONFIDENCE,
                GenerationPath::Heuristic => HEURISTIC_CONFIDENCE,
            },
            question: Some(question),
            text,
            sources,
        }
    }

    async fn synthesize_meta(&self, insights: &[InsightDraft]) -> String {
        let lines: Vec<String> = insights.iter().map(|i| i.text.clone()).collect();
        let rendered = prompt::render_template(
            prompt::META_REFLECTION,
            &[("insights", &prompt::render_memory_lines(&lines))],
        );
        let (text, _path) = generate_or_fallback(
            self.llm.as_ref(),
            "meta_reflection",
            rendered,
            GenerationOptions::structured(120),
            |raw| parse_prefixed_lines(raw, "INSIGHT:").into_iter().next(),
            || {
                format!(
                    "Stepping back over {} recent insights, the common thread is: {}",
                    lines.len(),
                    lines.first().map_or(String::new(), |l| l.clone()),
                )
            },
        )
        .await;
        text
    }
}

// ---------------------------------------------------------------------------
// Deterministic heuristics
// ---------------------------------------------------------------------------

/// Collect `PREFIX ...` lines from a structured response.
fn parse_prefixed_lines(text: &str, prefix: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix(prefix)
                .or_else(|| trimmed.strip_prefix(&prefix.to_ascii_lowercase()))
                .map(|rest| rest.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Count records whose description contains `needle` (case-insensitive).
fn count_mentions(records: &[MemoryRecord], needle: &str) -> usize {
    records
        .iter()
        .filter(|r| r.description.to_ascii_lowercase().contains(needle))
        .count()
}

/// The deterministic answer path. Fixed pattern detectors over memory
/// text; no randomness, so the same evidence always yields the same text.
fn heuristic_insight(question: &str, evidence: &[MemoryRecord]) -> String {
    let q = question.to_ascii_lowercase();
    let dead_ends = count_mentions(evidence, "dead end");
    let junctions = count_mentions(evidence, "junction");

    if q.contains("pattern") {
        if dead_ends >= 2 {
            return format!(
                "I keep hitting dead ends ({dead_ends} recently); my route choices are repeating themselves.",
            );
        }
        if junctions >= 2 {
            return format!(
                "Junctions come up again and again ({junctions} recently); this maze branches more than it ends.",
            );
        }
    }
    if q.contains("learned") {
        if count_mentions(evidence, "water") + count_mentions(evidence, "food") >= 2 {
            return "Supplies turn up along the routes I have already walked; remembering where matters more than hurrying.".to_string();
        }
    } else if q.contains("strateg") && dead_ends >= 1 {
        return "Backtracking from dead ends costs time; trying unexplored branches first has served better.".to_string();
    }

    let top = evidence
        .first()
        .map_or("nothing in particular", |r| r.description.as_str());
    format!(
        "Looking over {} recent experiences, the one that stands out most: {top}",
        evidence.len(),
    )
}

/// Legacy single-summary reflection, used when the enhanced path yields
/// nothing.
fn legacy_insight(focus: &[MemoryRecord]) -> InsightDraft {
    let top = focus
        .first()
        .map_or("an uneventful stretch", |r| r.description.as_str());
    InsightDraft {
        question: None,
        text: format!("Thinking back, what weighs on me most is: {top}"),
        sources: focus.iter().map(|r| r.id).collect(),
        importance: derived_importance(focus),
        category: ReflectionCategory::Pattern,
        confidence: HEURISTIC_CONFIDENCE,
    }
}

/// Derived importance: mean of the evidence, nudged up for synthesis.
fn derived_importance(evidence: &[MemoryRecord]) -> u8 {
    if evidence.is_empty() {
        return 5;
    }
    let mean = evidence.iter().map(|r| u32::from(r.importance)).sum::<u32>() as f32
        / evidence.len() as f32;
    ((mean.round() as u8) + 1).clamp(1, 10)
}

/// Keyword classification into a thematic category.
#[must_use]
pub fn classify_category(text: &str) -> ReflectionCategory {
    let lower = text.to_ascii_lowercase();
    if ["strateg", "should", "plan", "next time"].iter().any(|k| lower.contains(k)) {
        ReflectionCategory::Strategy
    } else if ["pattern", "keep", "again", "repeat"].iter().any(|k| lower.contains(k)) {
        ReflectionCategory::Pattern
    } else if ["afraid", "feel", "stress", "hope", "weighs"].iter().any(|k| lower.contains(k)) {
        ReflectionCategory::Emotional
    } else if ["learned", "know now", "matters", "remember"].iter().any(|k| lower.contains(k)) {
        ReflectionCategory::Learning
    } else if ["someone", "helped", "together", "other"].iter().any(|k| lower.contains(k)) {
        ReflectionCategory::Social
    } else {
        ReflectionCategory::Learning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::NullLanguageModel;

    fn ts(tick: u64) -> SimTimestamp {
        SimTimestamp::now(tick)
    }

    fn engine() -> ReflectionEngine {
        ReflectionEngine::new(
            ReflectionConfig::default(),
            RetrievalConfig::default(),
            Arc::new(NullLanguageModel),
            None,
        )
    }

    fn observation(importance: u8) -> MemoryRecord {
        MemoryRecord::new(
            MemoryKind::Observation,
            "walked into a dead end",
            importance,
            vec![],
            None,
            ts(0),
        )
    }

    #[test]
    fn importance_sum_fires_and_resets_at_threshold() {
        let mut engine = engine();
        let stream = MemoryStream::with_capacity(100);

        // 14 × 10 = 140: below the 150 threshold.
        for _ in 0..14 {
            engine.note_memory(&observation(10));
            assert_eq!(engine.check_trigger(&stream, ts(0)), None);
        }
        // One more crosses it.
        engine.note_memory(&observation(10));
        assert_eq!(
            engine.check_trigger(&stream, ts(1)),
            Some(ReflectionTrigger::ImportanceSum)
        );
        // Sum reset to zero immediately after firing.
        assert_eq!(engine.importance_sum(), 0.0);
        assert_eq!(engine.check_trigger(&stream, ts(2)), None);
    }

    #[test]
    fn plan_records_do_not_add_reflection_pressure() {
        let mut engine = engine();
        let plan = MemoryRecord::new(MemoryKind::Plan, "head east", 10, vec![], None, ts(0));
        engine.note_memory(&plan);
        assert_eq!(engine.importance_sum(), 0.0);
    }

    #[test]
    fn time_trigger_needs_memories_and_elapsed_time() {
        let mut engine = engine();
        let mut stream = MemoryStream::with_capacity(100);
        for i in 0..25u64 {
            stream.add_observation(format!("event {i}"), 1, vec![], None, ts(i));
        }
        // First check primes the clock.
        assert_eq!(engine.check_trigger(&stream, ts(100)), None);
        // Not enough elapsed time yet.
        assert_eq!(engine.check_trigger(&stream, ts(200)), None);
        // 600 simulated seconds later it fires.
        assert_eq!(
            engine.check_trigger(&stream, ts(701)),
            Some(ReflectionTrigger::Elapsed)
        );
    }

    #[tokio::test]
    async fn heuristic_reflection_is_deterministic() {
        let mut stream = MemoryStream::with_capacity(100);
        for i in 0..6u64 {
            stream.add_observation(
                format!("walked into a dead end at branch {i}"),
                7,
                vec![],
                None,
                ts(i),
            );
        }

        let mut first_engine = engine();
        let first = first_engine
            .reflect_now(&mut stream.clone(), ReflectionTrigger::ImportanceSum, ts(100))
            .await;
        let mut second_engine = engine();
        let second = second_engine
            .reflect_now(&mut stream, ReflectionTrigger::ImportanceSum, ts(100))
            .await;

        let first_texts: Vec<&str> = first.iter().map(|n| n.text.as_str()).collect();
        let second_texts: Vec<&str> = second.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(first_texts, second_texts);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn reflection_writes_records_and_tags_sources() {
        let mut stream = MemoryStream::with_capacity(100);
        for i in 0..4u64 {
            stream.add_observation(format!("found water at spring {i}"), 8, vec![], None, ts(i));
        }
        let mut engine = engine();
        let nodes = engine
            .reflect_now(&mut stream, ReflectionTrigger::ImportanceSum, ts(50))
            .await;
        assert!(!nodes.is_empty());
        assert!(nodes.iter().all(|n| n.level == 1));
        assert!(nodes.iter().all(|n| !n.source_ids.is_empty()));

        // Insights landed in the stream as tagged reflection records.
        let reflections = stream.by_kind(MemoryKind::Reflection);
        assert_eq!(reflections.len(), nodes.len());
        assert!(reflections.iter().all(|r| r
            .tags
            .iter()
            .any(|t| t.starts_with("derived:"))));

        // Sources now carry the reflected tag and won't be re-consumed.
        assert!(!stream.by_tag(REFLECTED_TAG).is_empty());
        let followup = engine
            .prepare_job(&stream, ReflectionTrigger::Elapsed, ts(51))
            .select_focus();
        assert!(followup.iter().all(|r| !r.has_tag(REFLECTED_TAG)));
    }

    #[tokio::test]
    async fn meta_reflection_appears_once_enough_level1_nodes() {
        let config = ReflectionConfig {
            meta_reflection_min_nodes: 3,
            ..ReflectionConfig::default()
        };
        let mut engine = ReflectionEngine::new(
            config,
            RetrievalConfig::default(),
            Arc::new(NullLanguageModel),
            None,
        );
        let mut stream = MemoryStream::with_capacity(100);
        for i in 0..8u64 {
            stream.add_observation(format!("junction after junction {i}"), 8, vec![], None, ts(i));
        }
        let nodes = engine
            .reflect_now(&mut stream, ReflectionTrigger::ImportanceSum, ts(20))
            .await;
        // Three question-driven insights put the tree at the meta minimum,
        // so a level-2 node rides along.
        assert!(nodes.iter().any(|n| n.level == 2));
        assert_eq!(engine.tree().max_depth(), 2);
        let meta = nodes.iter().find(|n| n.level == 2).expect("meta node");
        assert_eq!(meta.category, ReflectionCategory::Meta);
        assert!(!meta.source_ids.is_empty());
    }

    #[test]
    fn category_classification_keys_off_keywords() {
        assert_eq!(classify_category("Next time I should map the branches"), ReflectionCategory::Strategy);
        assert_eq!(classify_category("The same pattern again and again"), ReflectionCategory::Pattern);
        assert_eq!(classify_category("I feel worn down"), ReflectionCategory::Emotional);
        assert_eq!(classify_category("I learned where the water is"), ReflectionCategory::Learning);
    }

    #[test]
    fn prefixed_line_parser_tolerates_noise() {
        let text = "preamble\nQUESTION: one?\n  QUESTION: two?\nnot a question\nQUESTION:   \n";
        assert_eq!(parse_prefixed_lines(text, "QUESTION:"), vec!["one?", "two?"]);
    }
}
