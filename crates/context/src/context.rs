use crate::entities::*;
use crate::graph::DependencyGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sq_domain::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version stamped into `metadata` and checked on deserialization.
pub const SCHEMA_VERSION: u32 = 1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Namespaces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The seven top-level namespaces of an [`AgentContext`]. Each is owned
/// by a declared set of writer agents, enforced by the
/// [`ContextValidator`](crate::ContextValidator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Metadata,
    Reasoning,
    Enrichment,
    Retrieval,
    Llm,
    Diagnostics,
    Audit,
}

impl Namespace {
    pub const ALL: [Namespace; 7] = [
        Namespace::Metadata,
        Namespace::Reasoning,
        Namespace::Enrichment,
        Namespace::Retrieval,
        Namespace::Llm,
        Namespace::Diagnostics,
        Namespace::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Metadata => "metadata",
            Namespace::Reasoning => "reasoning",
            Namespace::Enrichment => "enrichment",
            Namespace::Retrieval => "retrieval",
            Namespace::Llm => "llm",
            Namespace::Diagnostics => "diagnostics",
            Namespace::Audit => "audit",
        }
    }

    pub fn parse(s: &str) -> Option<Namespace> {
        Namespace::ALL.into_iter().find(|ns| ns.as_str() == s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
    /// The user query this session is answering. Written once by the
    /// orchestrator at request entry.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    pub schema_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningNs {
    #[serde(default)]
    pub intents: Vec<Intent>,
    /// Extracted entities grouped by category (`"projects"`, `"dates"`, …).
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    pub dependency_graph: DependencyGraph,
    #[serde(default)]
    pub conclusions: Vec<Conclusion>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub inference_chain: Vec<InferenceStep>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnrichmentNs {
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub knowledge: Vec<Knowledge>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl EnrichmentNs {
    /// Resolve an evidence reference of the form `"fact:<id>"` or
    /// `"knowledge:<id>"`.
    pub fn resolves(&self, evidence_ref: &str) -> bool {
        match evidence_ref.split_once(':') {
            Some(("fact", id)) => self.facts.iter().any(|f| f.id == id),
            Some(("knowledge", id)) => self.knowledge.iter().any(|k| k.id == id),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetrievalNs {
    #[serde(default)]
    pub plans: Vec<RetrievalPlan>,
    #[serde(default)]
    pub queries: Vec<RetrievalQuery>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LlmNs {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: LlmUsage,
    #[serde(default)]
    pub decisions: Vec<LlmDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DiagnosticsNs {
    #[serde(default)]
    pub errors: Vec<DiagnosticEntry>,
    #[serde(default)]
    pub warnings: Vec<DiagnosticEntry>,
    #[serde(default)]
    pub metrics: BTreeMap<String, AgentMetrics>,
    #[serde(default)]
    pub validation: Vec<ValidationReport>,
    #[serde(default)]
    pub agent_traces: Vec<AgentTrace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuditNs {
    #[serde(default)]
    pub agent_runs: Vec<AgentRun>,
    #[serde(default)]
    pub diffs: Vec<super::ContextDiff>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single state object carried through a session.
///
/// Versioned, namespaced, deep-cloneable, bounded in size. Mutated only
/// through clone-then-merge by agents; created at request entry and
/// discarded after response serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub metadata: SessionMeta,
    #[serde(default)]
    pub reasoning: ReasoningNs,
    #[serde(default)]
    pub enrichment: EnrichmentNs,
    #[serde(default)]
    pub retrieval: RetrievalNs,
    #[serde(default)]
    pub llm: LlmNs,
    #[serde(default)]
    pub diagnostics: DiagnosticsNs,
    #[serde(default)]
    pub audit: AuditNs,
}

impl AgentContext {
    /// Create a fresh context with populated metadata and empty
    /// namespaces.
    pub fn new(session_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            metadata: SessionMeta {
                session_id: session_id.into(),
                trace_id: trace_id.into(),
                created_at: Utc::now(),
                query: None,
                locale: None,
                schema_version: SCHEMA_VERSION,
            },
            reasoning: ReasoningNs::default(),
            enrichment: EnrichmentNs::default(),
            retrieval: RetrievalNs::default(),
            llm: LlmNs::default(),
            diagnostics: DiagnosticsNs::default(),
            audit: AuditNs::default(),
        }
    }

    // ── Serialization ──────────────────────────────────────────────

    /// Serialize to JSON bytes. Serialization failures are fatal to the
    /// session.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes, rejecting unknown schema versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let ctx: AgentContext = serde_json::from_slice(bytes)?;
        if ctx.metadata.schema_version != SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "unsupported context schema version {} (expected {})",
                ctx.metadata.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(ctx)
    }

    // ── JSON views ─────────────────────────────────────────────────

    /// Serialize one namespace to a JSON object. Every slot of the
    /// namespace appears as a key (empty collections included), which is
    /// what makes the diff and the slot setter data-driven.
    pub fn namespace_value(&self, ns: Namespace) -> Result<Value> {
        let v = match ns {
            Namespace::Metadata => serde_json::to_value(&self.metadata)?,
            Namespace::Reasoning => serde_json::to_value(&self.reasoning)?,
            Namespace::Enrichment => serde_json::to_value(&self.enrichment)?,
            Namespace::Retrieval => serde_json::to_value(&self.retrieval)?,
            Namespace::Llm => serde_json::to_value(&self.llm)?,
            Namespace::Diagnostics => serde_json::to_value(&self.diagnostics)?,
            Namespace::Audit => serde_json::to_value(&self.audit)?,
        };
        Ok(v)
    }

    fn replace_namespace(&mut self, ns: Namespace, value: Value) -> Result<()> {
        match ns {
            Namespace::Metadata => self.metadata = serde_json::from_value(value)?,
            Namespace::Reasoning => self.reasoning = serde_json::from_value(value)?,
            Namespace::Enrichment => self.enrichment = serde_json::from_value(value)?,
            Namespace::Retrieval => self.retrieval = serde_json::from_value(value)?,
            Namespace::Llm => self.llm = serde_json::from_value(value)?,
            Namespace::Diagnostics => self.diagnostics = serde_json::from_value(value)?,
            Namespace::Audit => self.audit = serde_json::from_value(value)?,
        }
        Ok(())
    }

    /// Overwrite one slot of a namespace with a JSON value. The slot must
    /// be a known field of the namespace and the value must deserialize
    /// into its type.
    ///
    /// External code goes through
    /// [`ContextValidator::safe_set`](crate::ContextValidator::safe_set)
    /// instead, which enforces write registrations.
    pub fn set_slot(&mut self, ns: Namespace, key: &str, value: Value) -> Result<()> {
        let mut obj = self.namespace_value(ns)?;
        let map = obj
            .as_object_mut()
            .ok_or_else(|| Error::Other(format!("namespace {ns} is not an object")))?;
        if !map.contains_key(key) {
            return Err(Error::Config(format!("unknown slot {ns}.{key}")));
        }
        map.insert(key.to_string(), value);
        self.replace_namespace(ns, obj)
    }

    /// Read a slot by `"namespace.slot"` path.
    pub fn slot_value(&self, path: &str) -> Option<Value> {
        let (ns_str, key) = path.split_once('.')?;
        let ns = Namespace::parse(ns_str)?;
        let obj = self.namespace_value(ns).ok()?;
        obj.get(key).cloned()
    }

    /// Whether a `"namespace.slot"` path holds a meaningful value:
    /// non-null, and non-empty for strings, arrays, and objects.
    pub fn slot_present(&self, path: &str) -> bool {
        match self.slot_value(path) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }

    // ── Stats ──────────────────────────────────────────────────────

    /// Compute size and cardinality statistics. `total_size` is the
    /// authoritative serialized byte length; array counts are taken from
    /// the in-memory structures without re-serialization.
    pub fn stats(&self) -> Result<ContextStats> {
        let total_size = self.to_bytes()?.len();

        let mut size_by_namespace = BTreeMap::new();
        for ns in Namespace::ALL {
            let bytes = serde_json::to_vec(&self.namespace_value(ns)?)?;
            size_by_namespace.insert(ns.as_str().to_string(), bytes.len());
        }

        let mut array_counts = BTreeMap::new();
        let mut count = |path: &str, len: usize| {
            array_counts.insert(path.to_string(), len);
        };
        count("reasoning.intents", self.reasoning.intents.len());
        count("reasoning.hypotheses", self.reasoning.hypotheses.len());
        count("reasoning.conclusions", self.reasoning.conclusions.len());
        count("reasoning.alternatives", self.reasoning.alternatives.len());
        count("reasoning.inference_chain", self.reasoning.inference_chain.len());
        count("reasoning.artifacts", self.reasoning.artifacts.len());
        count("enrichment.facts", self.enrichment.facts.len());
        count("enrichment.knowledge", self.enrichment.knowledge.len());
        count("enrichment.relationships", self.enrichment.relationships.len());
        count("retrieval.plans", self.retrieval.plans.len());
        count("retrieval.queries", self.retrieval.queries.len());
        count("retrieval.artifacts", self.retrieval.artifacts.len());
        count("llm.decisions", self.llm.decisions.len());
        count("diagnostics.errors", self.diagnostics.errors.len());
        count("diagnostics.warnings", self.diagnostics.warnings.len());
        count("diagnostics.validation", self.diagnostics.validation.len());
        count("diagnostics.agent_traces", self.diagnostics.agent_traces.len());
        count("audit.agent_runs", self.audit.agent_runs.len());
        count("audit.diffs", self.audit.diffs.len());

        let externalized_count = self
            .all_artifacts()
            .filter(|a| a.external)
            .count();

        Ok(ContextStats {
            total_size,
            size_by_namespace,
            array_counts,
            externalized_count,
        })
    }

    /// All artifact slots, in stable order (reasoning then retrieval).
    pub fn all_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.reasoning
            .artifacts
            .iter()
            .chain(self.retrieval.artifacts.iter())
    }

    pub fn all_artifacts_mut(&mut self) -> impl Iterator<Item = &mut Artifact> {
        self.reasoning
            .artifacts
            .iter_mut()
            .chain(self.retrieval.artifacts.iter_mut())
    }
}

/// Size and cardinality report for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub total_size: usize,
    pub size_by_namespace: BTreeMap<String, usize>,
    pub array_counts: BTreeMap<String, usize>,
    pub externalized_count: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
