use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM orchestration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Fallback model when a task type has no selection strategy,
    /// format `"provider/model"`.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-key `"provider/model"` profile overrides merged over the
    /// built-in profile table.
    #[serde(default)]
    pub profiles: HashMap<String, ModelProfileOverride>,
    /// Per-provider runtime limits (rate, timeout) merged over profiles.
    #[serde(default)]
    pub providers: HashMap<String, ProviderRuntimeConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: d_default_model(),
            selection: SelectionConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
            profiles: HashMap::new(),
            providers: HashMap::new(),
        }
    }
}

/// Per-task-type candidate overrides. Keys are task-type names
/// (`"intent_classification"`, `"deep_reasoning"`, …); values are ordered
/// `"provider/model"` lists with the sentinel `"rule_based"` allowed as
/// the final entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectionConfig {
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(default)]
    pub fallbacks: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Session spend cap in USD.
    #[serde(default = "d_1_0")]
    pub session: f64,
    /// Per-agent spend cap in USD.
    #[serde(default = "d_0_25")]
    pub agent: f64,
    /// Fraction of the session budget at which selection downgrades to
    /// the cheapest fitting model.
    #[serde(default = "d_0_8")]
    pub warning_threshold: f64,
    /// Agents allowed to exceed both caps.
    #[serde(default = "d_critical_agents")]
    pub critical_agents: Vec<String>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session: 1.0,
            agent: 0.25,
            warning_threshold: 0.8,
            critical_agents: d_critical_agents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_10000")]
    pub max_entries: usize,
    #[serde(default = "d_64mb")]
    pub max_size_bytes: usize,
    /// Per-task-type TTL overrides in seconds, keyed by task-type name.
    #[serde(default)]
    pub ttls_by_task: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_size_bytes: 64 * 1024 * 1024,
            ttls_by_task: HashMap::new(),
        }
    }
}

/// Partial profile override; unset fields keep the built-in value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelProfileOverride {
    #[serde(default)]
    pub quality: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub cost_per_1k_tokens: Option<f64>,
    #[serde(default)]
    pub context_limit: Option<usize>,
    #[serde(default)]
    pub supports_streaming: Option<bool>,
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub is_local: Option<bool>,
    #[serde(default)]
    pub requires_auth: Option<bool>,
}

/// Runtime limits applied to every model of one provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ProviderRuntimeConfig {
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_default_model() -> String {
    "local/rule-based".into()
}
fn d_true() -> bool {
    true
}
fn d_1_0() -> f64 {
    1.0
}
fn d_0_25() -> f64 {
    0.25
}
fn d_0_8() -> f64 {
    0.8
}
fn d_critical_agents() -> Vec<String> {
    vec!["validator".into(), "summarizer".into()]
}
fn d_10000() -> usize {
    10_000
}
fn d_64mb() -> usize {
    64 * 1024 * 1024
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
