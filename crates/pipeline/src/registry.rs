use crate::agent::Agent;
use sq_context::ContextValidator;
use sq_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared registry of agents addressable from pipeline configs. Both
/// full pipelines and single-agent workflows resolve against the same
/// registry.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its declared id. A duplicate id replaces
    /// the previous registration (latest wins).
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Resolve an id; unknown ids are a fatal configuration error.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown agent id '{id}'")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Build the write-isolation validator from every registered
    /// agent's declared namespaces.
    pub fn build_validator(&self) -> ContextValidator {
        let mut validator = ContextValidator::new();
        for agent in self.agents.values() {
            validator.register_agent(agent.id(), &agent.write_namespaces());
        }
        validator
    }
}
