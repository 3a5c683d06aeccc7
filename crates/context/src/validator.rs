use crate::context::{AgentContext, Namespace};
use crate::diff::ContextDiff;
use serde_json::Value;
use sq_domain::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Write-isolation validator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The orchestrator's agent id; permitted to write all namespaces.
pub const WILDCARD_AGENT: &str = "*";

/// Registry of which namespaces each agent may write.
///
/// Writes outside an agent's registration are rejected with
/// [`Error::ContextViolation`], which is non-retryable.
#[derive(Debug, Clone, Default)]
pub struct ContextValidator {
    registrations: BTreeMap<String, BTreeSet<Namespace>>,
}

impl ContextValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) an agent's allowed namespaces.
    pub fn register_agent(&mut self, agent_id: &str, namespaces: &[Namespace]) {
        self.registrations
            .entry(agent_id.to_string())
            .or_default()
            .extend(namespaces.iter().copied());
    }

    pub fn allowed(&self, agent_id: &str) -> Option<&BTreeSet<Namespace>> {
        self.registrations.get(agent_id)
    }

    /// Whether `agent_id` may write `namespace`.
    pub fn check_write(&self, agent_id: &str, namespace: Namespace) -> bool {
        if agent_id == WILDCARD_AGENT {
            return true;
        }
        self.registrations
            .get(agent_id)
            .is_some_and(|set| set.contains(&namespace))
    }

    /// Write one slot on behalf of `agent_id`, rejecting writes outside
    /// its registration.
    pub fn safe_set(
        &self,
        ctx: &mut AgentContext,
        agent_id: &str,
        namespace: Namespace,
        key: &str,
        value: Value,
    ) -> Result<()> {
        if !self.check_write(agent_id, namespace) {
            return Err(Error::ContextViolation {
                agent_id: agent_id.to_string(),
                namespace: namespace.as_str().to_string(),
                key: key.to_string(),
            });
        }
        ctx.set_slot(namespace, key, value)
    }

    /// Check a post-run diff against the writer's registration. Any
    /// agent may write `diagnostics` (errors/warnings) and the framework
    /// itself appends to `audit`, so those two namespaces are always
    /// permitted.
    pub fn validate_diff(&self, agent_id: &str, diff: &ContextDiff) -> Result<()> {
        if agent_id == WILDCARD_AGENT {
            return Ok(());
        }
        for ns_str in diff.namespaces() {
            let Some(ns) = Namespace::parse(ns_str) else {
                continue;
            };
            if matches!(ns, Namespace::Diagnostics | Namespace::Audit) {
                continue;
            }
            if !self.check_write(agent_id, ns) {
                let key = diff
                    .changes
                    .get(ns_str)
                    .and_then(|slots| slots.first())
                    .map(|c| c.slot.clone())
                    .unwrap_or_default();
                return Err(Error::ContextViolation {
                    agent_id: agent_id.to_string(),
                    namespace: ns_str.to_string(),
                    key,
                });
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
