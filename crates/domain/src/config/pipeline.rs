use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declarative pipeline: ordered agent entries plus execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: PipelineMode,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub options: PipelineOptions,
}

impl Default for PipelineConfig {
    /// The standard full reasoning pipeline. A `[pipeline]` section in
    /// config replaces this wholesale.
    fn default() -> Self {
        let agents = [
            "intent",
            "structure",
            "planner",
            "executor",
            "synthesizer",
            "inference",
            "validator",
            "summarizer",
        ]
        .into_iter()
        .map(AgentSpec::new)
        .collect();
        Self {
            mode: PipelineMode::Sequential,
            agents,
            options: PipelineOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Sequential,
    Parallel,
    Conditional,
}

/// One agent entry in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_30000u")]
    pub timeout_ms: u64,
    /// Retry attempts after the first failure (0 = no retries).
    #[serde(default)]
    pub retry: u32,
    /// Agent ids that must complete before this one runs (parallel mode).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Gate predicate evaluated before execution (conditional mode),
    /// e.g. `"reasoning.intents not_empty"` or
    /// `"metadata.locale eq en"`.
    #[serde(default)]
    pub condition: Option<String>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            timeout_ms: 30_000,
            retry: 0,
            depends_on: Vec::new(),
            condition: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Check declared pre/postconditions around every execution.
    #[serde(default = "d_true")]
    pub validate_contract: bool,
    /// Stop the pipeline at the first contract violation or agent failure.
    #[serde(default)]
    pub fail_on_violation: bool,
    /// Record per-agent duration and LLM spend metrics.
    #[serde(default = "d_true")]
    pub track_performance: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            validate_contract: true,
            fail_on_violation: false,
            track_performance: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_30000u() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_spec_defaults() {
        let spec: AgentSpec = serde_json::from_str(r#"{"id": "intent"}"#).unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.timeout_ms, 30_000);
        assert_eq!(spec.retry, 0);
        assert!(spec.depends_on.is_empty());
        assert!(spec.condition.is_none());
    }

    #[test]
    fn pipeline_mode_snake_case() {
        let mode: PipelineMode = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(mode, PipelineMode::Parallel);
    }

    #[test]
    fn default_pipeline_is_the_full_agent_chain() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.mode, PipelineMode::Sequential);
        assert_eq!(pipeline.agents.first().map(|a| a.id.as_str()), Some("intent"));
        assert_eq!(
            pipeline.agents.last().map(|a| a.id.as_str()),
            Some("summarizer")
        );
        assert_eq!(pipeline.agents.len(), 8);
    }
}
