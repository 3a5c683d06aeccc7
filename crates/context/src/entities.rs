use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of intent types. Agents dispatch on this enum; nothing in
/// the pipeline matches on raw intent strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    QueryCommits,
    QueryIssues,
    QueryMergeRequests,
    QueryPipelines,
    SearchCode,
    ExplainConcept,
    SummarizeActivity,
    Unknown,
}

impl IntentKind {
    pub const ALL: [IntentKind; 8] = [
        IntentKind::QueryCommits,
        IntentKind::QueryIssues,
        IntentKind::QueryMergeRequests,
        IntentKind::QueryPipelines,
        IntentKind::SearchCode,
        IntentKind::ExplainConcept,
        IntentKind::SummarizeActivity,
        IntentKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::QueryCommits => "query_commits",
            IntentKind::QueryIssues => "query_issues",
            IntentKind::QueryMergeRequests => "query_merge_requests",
            IntentKind::QueryPipelines => "query_pipelines",
            IntentKind::SearchCode => "search_code",
            IntentKind::ExplainConcept => "explain_concept",
            IntentKind::SummarizeActivity => "summarize_activity",
            IntentKind::Unknown => "unknown",
        }
    }

    /// Whether this intent warrants the deeper reasoning path.
    pub fn is_reasoning_class(&self) -> bool {
        matches!(self, IntentKind::ExplainConcept | IntentKind::SummarizeActivity)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified user intent.
///
/// Downstream planners skip intents with confidence below
/// [`Intent::PLANNING_THRESHOLD`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl Intent {
    /// Below this confidence, planners ignore the intent.
    pub const PLANNING_THRESHOLD: f64 = 0.3;

    pub fn is_actionable(&self) -> bool {
        self.confidence >= Self::PLANNING_THRESHOLD
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hypotheses and conclusions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A hypothesis to verify. Ids are unique within a session; the graph
/// induced by `dependencies` must be acyclic after cycle-breaking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A verified conclusion with evidence references into the enrichment
/// namespace (`"fact:<id>"` or `"knowledge:<id>"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub id: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub intent: IntentKind,
}

/// A rejected or lower-ranked alternative to a conclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub conclusion_id: String,
    pub description: String,
    pub confidence: f64,
}

/// One step of the hypothesis-verification trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceStep {
    pub hypothesis_id: String,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Supported,
    Refuted,
    Undetermined,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A retrieved or derived fact. `provenance` must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub content: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub provenance: BTreeMap<String, String>,
}

/// Knowledge derived from one or more facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub derived_from: Vec<String>,
    pub confidence: f64,
}

/// A typed relation between two enrichment entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_id: String,
    pub to_id: String,
    pub kind: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub id: String,
    pub intent: IntentKind,
    pub sources: Vec<String>,
    pub priority: u8,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub plan_id: String,
    pub source: String,
    pub query: String,
}

/// An artifact payload carried in the context. Payloads above the
/// externalization threshold are swapped for an opaque storage reference
/// with `external = true`; identity and ordering are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub label: String,
    /// The datasource that produced this artifact, when known.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub storage_ref: Option<String>,
    #[serde(default)]
    pub external: bool,
}

impl Artifact {
    pub fn inline(id: impl Into<String>, label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            source: None,
            payload: Some(payload.into()),
            storage_ref: None,
            external: false,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_deref().map_or(0, str::len)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM accounting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model-selection decision. The log is append-only; every selection
/// attempt (success, fallback, cache hit, budget refusal) records exactly
/// one terminal entry, fallback hops record one entry each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmDecision {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub task_type: String,
    /// Format `"provider/model"`.
    pub selected: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub by_agent: BTreeMap<String, AgentUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    /// Stable machine-readable code, e.g. `"dependency-cycle"`.
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentMetrics {
    pub duration_ms: u64,
    pub llm_calls: u32,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub check: String,
    pub passed: bool,
    #[serde(default)]
    pub details: Vec<String>,
}

/// A typed per-agent trace record (the explicit contract for what an
/// agent may log about its own execution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTrace {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub step: String,
    pub detail: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One agent completion record, appended atomically per terminal
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub keys_written: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}
