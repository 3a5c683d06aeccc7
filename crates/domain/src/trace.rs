use serde::Serialize;

/// Structured trace events emitted across all Sequent crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    PipelineStarted {
        session_id: String,
        workflow: String,
        mode: String,
        agent_count: usize,
    },
    PipelineFinished {
        session_id: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },
    AgentStarted {
        session_id: String,
        agent_id: String,
        attempt: u32,
    },
    AgentFinished {
        session_id: String,
        agent_id: String,
        status: String,
        duration_ms: u64,
        keys_written: usize,
    },
    AgentRetry {
        session_id: String,
        agent_id: String,
        attempt: u32,
        backoff_ms: u64,
        error: String,
    },
    ContextViolation {
        session_id: String,
        agent_id: String,
        namespace: String,
        key: String,
    },
    CycleBroken {
        session_id: String,
        members: Vec<String>,
        removed_edge_from: String,
        removed_edge_to: String,
    },
    LlmSelected {
        agent_id: String,
        task_type: String,
        provider: String,
        model: String,
        reason: String,
    },
    LlmFallback {
        agent_id: String,
        task_type: String,
        from_model: String,
        to_model: String,
        reason: String,
    },
    LlmCacheHit {
        agent_id: String,
        task_type: String,
        model: String,
    },
    BudgetDowngrade {
        agent_id: String,
        session_spent_usd: f64,
        session_budget_usd: f64,
        downgraded_to: String,
    },
    BudgetExhausted {
        agent_id: String,
        scope: String,
        spent_usd: f64,
        limit_usd: f64,
    },
    ThrottleWait {
        provider: String,
        model: String,
        waited_ms: u64,
    },
    ArtifactExternalized {
        session_id: String,
        artifact_id: String,
        payload_bytes: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sq_event");
    }
}
