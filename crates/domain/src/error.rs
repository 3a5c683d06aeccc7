/// Shared error type used across all Sequent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Unauthorized context write. Non-retryable.
    #[error("context violation: agent '{agent_id}' may not write {namespace}.{key}")]
    ContextViolation {
        agent_id: String,
        namespace: String,
        key: String,
    },

    /// A context size limit was exceeded. The caller may externalize
    /// oversized artifacts and retry.
    #[error("context size: {limit} is {current} bytes, maximum {maximum}")]
    ContextSize {
        limit: String,
        current: usize,
        maximum: usize,
    },

    /// A declared precondition slot is absent from the context.
    #[error("precondition missing: agent '{agent_id}' requires {slot}")]
    PreconditionMissing { agent_id: String, slot: String },

    /// A declared postcondition slot was not populated by a successful run.
    #[error("postcondition missing: agent '{agent_id}' promised {slot}")]
    PostconditionMissing { agent_id: String, slot: String },

    /// An agent exceeded its configured timeout. Retryable up to the
    /// configured retry budget.
    #[error("agent '{agent_id}' timed out after {timeout_ms}ms")]
    AgentTimeout { agent_id: String, timeout_ms: u64 },

    /// A provider call failed. `status` carries the HTTP status when one
    /// was received (429 and 5xx are retryable through the fallback chain).
    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// The session or per-agent budget is exhausted and the agent is not
    /// critical. Agents trap this to take their rule-based path.
    #[error("budget exceeded for agent '{agent_id}': spent {spent_usd:.4} of {limit_usd:.4} USD ({scope})")]
    BudgetExceeded {
        agent_id: String,
        scope: String,
        spent_usd: f64,
        limit_usd: f64,
    },

    /// No provider candidate remained after the fallback chain.
    #[error("no provider available for task '{task_type}'")]
    NoProvider { task_type: String },

    #[error("config: {0}")]
    Config(String),

    /// Cooperative cancellation. The pipeline returns the partial context
    /// alongside this error.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the pipeline may retry the failed agent step.
    ///
    /// Timeouts and provider errors are retryable; contract violations,
    /// budget exhaustion, and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AgentTimeout { .. }
                | Error::Provider { .. }
                | Error::Timeout(_)
                | Error::Http(_)
        )
    }

    /// Whether a provider error should be absorbed by the fallback chain
    /// (HTTP 429, 5xx, or a transport-level failure).
    pub fn is_provider_transient(&self) -> bool {
        match self {
            Error::Provider { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            Error::Timeout(_) | Error::Http(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::AgentTimeout {
            agent_id: "x".into(),
            timeout_ms: 100
        }
        .is_retryable());
        assert!(!Error::ContextViolation {
            agent_id: "x".into(),
            namespace: "reasoning".into(),
            key: "intents".into()
        }
        .is_retryable());
        assert!(!Error::BudgetExceeded {
            agent_id: "x".into(),
            scope: "session".into(),
            spent_usd: 1.0,
            limit_usd: 0.5
        }
        .is_retryable());
    }

    #[test]
    fn provider_transient_statuses() {
        let e429 = Error::Provider {
            provider: "openai".into(),
            status: Some(429),
            message: "rate limited".into(),
        };
        let e503 = Error::Provider {
            provider: "openai".into(),
            status: Some(503),
            message: "overloaded".into(),
        };
        let e401 = Error::Provider {
            provider: "openai".into(),
            status: Some(401),
            message: "bad key".into(),
        };
        assert!(e429.is_provider_transient());
        assert!(e503.is_provider_transient());
        assert!(!e401.is_provider_transient());
    }
}
