use chrono::Utc;
use sq_context::{AgentContext, AgentTrace, AgentUsage};
use sq_orchestrator::{BudgetTracker, LlmOutcome};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome → context merge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fold one LLM outcome into the context's `llm` namespace and the
/// agent's performance metrics.
///
/// The decision log is mirrored wholesale from the session's budget
/// tracker, which is the authoritative append-only record.
pub fn apply_outcome(
    ctx: &mut AgentContext,
    agent_id: &str,
    outcome: &LlmOutcome,
    budget: &BudgetTracker,
) {
    ctx.llm.provider = Some(outcome.provider.clone());
    ctx.llm.model = Some(outcome.model.clone());
    ctx.llm.decisions = budget.decisions();

    if !outcome.cache_hit && !outcome.rule_based {
        ctx.llm.usage.prompt_tokens += u64::from(outcome.prompt_tokens);
        ctx.llm.usage.completion_tokens += u64::from(outcome.completion_tokens);
        ctx.llm.usage.total_cost_usd += outcome.cost_usd;
        let per_agent = ctx
            .llm
            .usage
            .by_agent
            .entry(agent_id.to_string())
            .or_insert_with(AgentUsage::default);
        per_agent.prompt_tokens += u64::from(outcome.prompt_tokens);
        per_agent.completion_tokens += u64::from(outcome.completion_tokens);
        per_agent.cost_usd += outcome.cost_usd;
    }

    let metrics = ctx
        .diagnostics
        .metrics
        .entry(agent_id.to_string())
        .or_default();
    metrics.llm_calls += 1;
    metrics.cost_usd += outcome.cost_usd;

    ctx.diagnostics.agent_traces.push(AgentTrace {
        timestamp: Utc::now(),
        agent_id: agent_id.to_string(),
        step: "llm".into(),
        detail: format!(
            "{}/{} reason={} tokens={} cost={:.6}",
            outcome.provider,
            outcome.model,
            outcome.reason,
            outcome.total_tokens(),
            outcome.cost_usd
        ),
    });
}

/// Rough prompt-side token estimate (4 chars ≈ 1 token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
