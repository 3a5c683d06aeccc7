use super::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Named workflows selectable per request. Every workflow resolves to a
/// [`PipelineConfig`] over the shared agent registry; the workflow named
/// by `default` is used when a request carries no selection header.
///
/// A single-agent workflow is just a one-entry pipeline; there is no
/// separate scaffold for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowsConfig {
    /// Workflows accepted from requests. The `default` workflow must be
    /// listed here.
    #[serde(default = "d_enabled")]
    pub enabled: Vec<String>,
    #[serde(default = "d_default_workflow")]
    pub default: String,
    /// Per-workflow pipeline definitions. The workflow named `"full"`
    /// falls back to the top-level `[pipeline]` section when absent here.
    #[serde(default)]
    pub pipelines: HashMap<String, PipelineConfig>,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            default: d_default_workflow(),
            pipelines: HashMap::new(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_enabled() -> Vec<String> {
    vec!["full".into()]
}
fn d_default_workflow() -> String {
    "full".into()
}
