use crate::profiles::ProfileTable;
use parking_lot::Mutex;
use sq_context::LlmDecision;
use sq_domain::config::BudgetConfig;
use sq_domain::error::{Error, Result};
use std::collections::{HashMap, HashSet};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-session budget tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct BudgetState {
    session_spent: f64,
    by_agent: HashMap<String, f64>,
    decisions: Vec<LlmDecision>,
}

/// Session-scoped spend accumulators plus the session decision log.
///
/// One tracker exists per session; the process-wide side of accounting
/// is [`UsageAggregate`], which is metrics-only and never gates
/// requests.
pub struct BudgetTracker {
    session_budget: f64,
    agent_budget: f64,
    warning_threshold: f64,
    critical_agents: HashSet<String>,
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            session_budget: config.session,
            agent_budget: config.agent,
            warning_threshold: config.warning_threshold,
            critical_agents: config.critical_agents.iter().cloned().collect(),
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn session_budget(&self) -> f64 {
        self.session_budget
    }

    pub fn session_spent(&self) -> f64 {
        self.state.lock().session_spent
    }

    pub fn agent_spent(&self, agent_id: &str) -> f64 {
        self.state
            .lock()
            .by_agent
            .get(agent_id)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_critical(&self, agent_id: &str) -> bool {
        self.critical_agents.contains(agent_id)
    }

    /// Whether the session has crossed `warning_threshold ×
    /// session_budget` (triggers selection downgrade).
    pub fn in_warning(&self) -> bool {
        self.session_spent() >= self.warning_threshold * self.session_budget
    }

    /// Enforce session and per-agent caps. Critical agents always pass.
    pub fn check(&self, agent_id: &str) -> Result<()> {
        if self.is_critical(agent_id) {
            return Ok(());
        }
        let state = self.state.lock();
        if state.session_spent >= self.session_budget {
            return Err(Error::BudgetExceeded {
                agent_id: agent_id.to_string(),
                scope: "session".into(),
                spent_usd: state.session_spent,
                limit_usd: self.session_budget,
            });
        }
        let agent_spent = state.by_agent.get(agent_id).copied().unwrap_or(0.0);
        if agent_spent >= self.agent_budget {
            return Err(Error::BudgetExceeded {
                agent_id: agent_id.to_string(),
                scope: "agent".into(),
                spent_usd: agent_spent,
                limit_usd: self.agent_budget,
            });
        }
        Ok(())
    }

    /// Add `cost_per_1k × tokens / 1000` for the given model to both the
    /// session and per-agent accumulators, returning the cost delta.
    /// Unprofiled models cost nothing.
    pub fn track_usage(
        &self,
        profiles: &ProfileTable,
        agent_id: &str,
        model_key: &str,
        tokens: u64,
    ) -> f64 {
        let cost = profiles
            .get(model_key)
            .map(|p| p.cost_per_1k_tokens * tokens as f64 / 1000.0)
            .unwrap_or(0.0);
        let mut state = self.state.lock();
        state.session_spent += cost;
        *state.by_agent.entry(agent_id.to_string()).or_insert(0.0) += cost;
        cost
    }

    /// Append one selection decision to the session log.
    pub fn record_decision(&self, decision: LlmDecision) {
        self.state.lock().decisions.push(decision);
    }

    pub fn decisions(&self) -> Vec<LlmDecision> {
        self.state.lock().decisions.clone()
    }

    /// Zero the accumulators and clear the decision log. The response
    /// cache is deliberately untouched.
    pub fn reset_session(&self) {
        let mut state = self.state.lock();
        state.session_spent = 0.0;
        state.by_agent.clear();
        state.decisions.clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Process-wide aggregate (metrics only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct UsageTotals {
    pub sessions: u64,
    pub requests: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Cross-session usage totals for observability endpoints. Never
/// consulted by budget enforcement.
#[derive(Default)]
pub struct UsageAggregate {
    totals: Mutex<UsageTotals>,
}

impl UsageAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&self) {
        self.totals.lock().sessions += 1;
    }

    pub fn record_request(&self, tokens: u64, cost_usd: f64) {
        let mut totals = self.totals.lock();
        totals.requests += 1;
        totals.tokens += tokens;
        totals.cost_usd += cost_usd;
    }

    pub fn snapshot(&self) -> UsageTotals {
        *self.totals.lock()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
