//! Configuration for the reverie cognitive system.
//!
//! Maps directly to `reverie.toml`. Every empirically chosen constant in the
//! pipeline (decay factor, stress noise, divergence thresholds, trigger sums)
//! is a tunable default here, not a hard-coded semantic.

use serde::{Deserialize, Serialize};

/// Top-level cognitive configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CognitionConfig {
    /// Memory stream capacity and retention.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval scoring settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reflection trigger and synthesis settings.
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Planning and re-planning settings.
    #[serde(default)]
    pub planning: PlanningConfig,
    /// Decision arbitration settings.
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Language-model integration settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl CognitionConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CognitionError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::CognitionError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Memory stream capacity and retention-scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Hard cap on records in the stream.
    #[serde(default = "default_500")]
    pub capacity: usize,
    /// Retention weight for recency (e^(-hours/24)).
    #[serde(default = "default_0_4")]
    pub retention_recency_weight: f32,
    /// Retention weight for normalized importance.
    #[serde(default = "default_0_6")]
    pub retention_importance_weight: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            retention_recency_weight: 0.4,
            retention_importance_weight: 0.6,
        }
    }
}

/// Retrieval scoring weights — must sum to ~1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalWeights {
    /// Weight for the recency factor.
    #[serde(default = "default_0_3")]
    pub recency: f32,
    /// Weight for the importance factor.
    #[serde(default = "default_0_3")]
    pub importance: f32,
    /// Weight for semantic relevance.
    #[serde(default = "default_0_4")]
    pub relevance: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: 0.3,
            importance: 0.3,
            relevance: 0.4,
        }
    }
}

/// Memory retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Per-hour recency decay factor, in (0, 1).
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f32,
    /// Scoring weight tuning.
    #[serde(default)]
    pub weights: RetrievalWeights,
    /// Default number of memories retrieved when the caller has no opinion.
    #[serde(default = "default_5_usize")]
    pub default_k: usize,
    /// Stress modifier below which retrieval noise is injected.
    #[serde(default = "default_0_8")]
    pub stress_noise_threshold: f32,
    /// Noise magnitude per unit of stress degradation (1 - stress_modifier).
    #[serde(default = "default_0_3")]
    pub stress_noise_scale: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.995,
            weights: RetrievalWeights::default(),
            default_k: 5,
            stress_noise_threshold: 0.8,
            stress_noise_scale: 0.3,
        }
    }
}

/// Reflection trigger and synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Running importance sum that fires a reflection.
    #[serde(default = "default_150")]
    pub importance_trigger_sum: f32,
    /// Minimum memory count before the time-based fallback can fire.
    #[serde(default = "default_20_usize")]
    pub min_memories_for_time_trigger: usize,
    /// Minimum simulated seconds between time-triggered reflections.
    #[serde(default = "default_600")]
    pub min_seconds_between: u64,
    /// How many of the most important unreflected memories to focus on.
    #[serde(default = "default_10_usize")]
    pub max_focus_memories: usize,
    /// Questions generated per reflection pass.
    #[serde(default = "default_3_usize")]
    pub questions_per_reflection: usize,
    /// Memories retrieved per question when synthesizing an answer.
    #[serde(default = "default_5_usize")]
    pub memories_per_question: usize,
    /// Recent level-1 nodes required before a meta-reflection is synthesized.
    #[serde(default = "default_5_usize")]
    pub meta_reflection_min_nodes: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            importance_trigger_sum: 150.0,
            min_memories_for_time_trigger: 20,
            min_seconds_between: 600,
            max_focus_memories: 10,
            questions_per_reflection: 3,
            memories_per_question: 5,
            meta_reflection_min_nodes: 5,
        }
    }
}

/// Planning and re-planning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Survival level (0-100) below which a resource is critical.
    #[serde(default = "default_20_f32")]
    pub critical_resource_threshold: f32,
    /// Exploration progress below which exploring outranks exit-seeking.
    #[serde(default = "default_0_5")]
    pub exploration_goal_fraction: f32,
    /// Planning quantum — action duration in simulated minutes.
    #[serde(default = "default_5_u32")]
    pub action_quantum_minutes: u32,
    /// Distance-to-target growth factor that counts as divergence.
    #[serde(default = "default_1_5")]
    pub divergence_threshold: f32,
    /// In-progress actions running longer than this multiple of their
    /// duration count as diverged.
    #[serde(default = "default_3_f32")]
    pub overrun_factor: f32,
    /// Unclaimed nearby items that justify re-planning while exploring.
    #[serde(default = "default_3_usize")]
    pub item_cluster_size: usize,
    /// Radius (tiles) for the nearby-item cluster check.
    #[serde(default = "default_5_f32")]
    pub item_cluster_radius: f32,
    /// Hourly plan slots generated per daily plan.
    #[serde(default = "default_4_usize")]
    pub hours_per_daily_plan: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            critical_resource_threshold: 20.0,
            exploration_goal_fraction: 0.5,
            action_quantum_minutes: 5,
            divergence_threshold: 1.5,
            overrun_factor: 3.0,
            item_cluster_size: 3,
            item_cluster_radius: 5.0,
            hours_per_daily_plan: 4,
        }
    }
}

/// Decision arbitration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Minimum simulated seconds between decisions.
    #[serde(default = "default_3_f32")]
    pub min_interval_seconds: f32,
    /// Urgent-need level below which the survival override takes over.
    #[serde(default = "default_20_f32")]
    pub critical_override_threshold: f32,
    /// Confidence reported for a goal-directed heuristic move.
    #[serde(default = "default_0_7")]
    pub heuristic_move_confidence: f32,
    /// Confidence reported for an exploratory heuristic move.
    #[serde(default = "default_0_4")]
    pub explore_confidence: f32,
    /// How many recent memories go into the reactive prompt.
    #[serde(default = "default_5_usize")]
    pub recent_memories_in_prompt: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: 3.0,
            critical_override_threshold: 20.0,
            heuristic_move_confidence: 0.7,
            explore_confidence: 0.4,
            recent_memories_in_prompt: 5,
        }
    }
}

/// Language-model integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name used for all generation calls.
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Embedding vector dimensions.
    #[serde(default = "default_384")]
    pub embedding_dimensions: usize,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
    /// Max retries before falling back to the heuristic path.
    #[serde(default = "default_2")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:1.5b".to_string(),
            embedding_model: "all-minilm".to_string(),
            embedding_dimensions: 384,
            request_timeout_ms: 5000,
            max_retries: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_embedding_model() -> String { "all-minilm".to_string() }
fn default_0_3() -> f32 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_0_5() -> f32 { 0.5 }
fn default_0_6() -> f32 { 0.6 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f32 { 0.8 }
fn default_1_5() -> f32 { 1.5 }
fn default_3_f32() -> f32 { 3.0 }
fn default_5_f32() -> f32 { 5.0 }
fn default_20_f32() -> f32 { 20.0 }
fn default_decay_factor() -> f32 { 0.995 }
fn default_150() -> f32 { 150.0 }
fn default_2() -> u32 { 2 }
fn default_5_u32() -> u32 { 5 }
fn default_3_usize() -> usize { 3 }
fn default_4_usize() -> usize { 4 }
fn default_5_usize() -> usize { 5 }
fn default_10_usize() -> usize { 10 }
fn default_20_usize() -> usize { 20 }
fn default_384() -> usize { 384 }
fn default_500() -> usize { 500 }
fn default_600() -> u64 { 600 }
fn default_5000() -> u64 { 5000 }
