use sq_context::{AgentContext, Namespace};
use sq_domain::error::Result;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declared operational capabilities of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentCapabilities {
    /// Safe to dispatch concurrently with other agents in a DAG layer.
    pub parallel_safe: bool,
    /// Safe to re-execute after a failure (execution has no external
    /// side effects beyond its context writes).
    pub retry_safe: bool,
    pub requires_llm: bool,
    /// `execute(execute(ctx)) ≡ execute(ctx)` modulo audit timestamps.
    pub deterministic: bool,
    pub estimated_duration_ms: u64,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            parallel_safe: true,
            retry_safe: true,
            requires_llm: false,
            deterministic: true,
            estimated_duration_ms: 50,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The contract every pipeline agent implements.
///
/// `execute` is clone-in / clone-out: the agent takes ownership of a
/// deep clone, mutates it, and returns it. Preconditions and
/// postconditions are `"namespace.slot"` paths checked by the manager
/// when contract validation is enabled.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent id referenced from pipeline config.
    fn id(&self) -> &str;

    /// Slot paths that must be present before execution.
    fn preconditions(&self) -> &[&str] {
        &[]
    }

    /// Slot paths this agent promises to populate on success.
    fn postconditions(&self) -> &[&str] {
        &[]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::default()
    }

    /// Namespaces this agent is registered to write. Defaults to the
    /// namespaces named by its postconditions.
    fn write_namespaces(&self) -> Vec<Namespace> {
        let mut out: Vec<Namespace> = Vec::new();
        for path in self.postconditions() {
            if let Some((ns_str, _)) = path.split_once('.') {
                if let Some(ns) = Namespace::parse(ns_str) {
                    if !out.contains(&ns) {
                        out.push(ns);
                    }
                }
            }
        }
        out
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        ctx: AgentContext,
    ) -> Result<AgentContext>;
}
