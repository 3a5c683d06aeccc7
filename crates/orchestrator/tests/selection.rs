//! Integration tests for the selection algorithm: fallback chains,
//! cache idempotence, budget gates, downgrade, and the deterministic
//! sentinel. All tests run against scripted in-process providers.

use parking_lot::Mutex;
use sq_domain::config::LlmConfig;
use sq_domain::error::{Error, Result};
use sq_orchestrator::{LlmOrchestrator, LlmRequest, TaskType};
use sq_providers::{CallParams, ProviderClient, ProviderRegistry, ProviderResponse};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pops one scripted result per call; defaults to success when the
/// script runs dry.
struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<ProviderResponse>>>,
}

impl ScriptedProvider {
    fn new(id: &str, script: Vec<Result<ProviderResponse>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
        })
    }

    fn ok(content: &str) -> Result<ProviderResponse> {
        Ok(ProviderResponse {
            content: content.into(),
            prompt_tokens: 100,
            completion_tokens: 50,
        })
    }

    fn http_error(id: &str, status: u16) -> Result<ProviderResponse> {
        Err(Error::Provider {
            provider: id.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
        })
    }
}

#[async_trait::async_trait]
impl ProviderClient for ScriptedProvider {
    async fn call(
        &self,
        _cancel: &CancellationToken,
        _model: &str,
        _prompt: &str,
        _params: CallParams,
    ) -> Result<ProviderResponse> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Self::ok("scripted default"))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Config whose `deep_reasoning` chain is primary → backup → local →
/// sentinel.
fn chain_config() -> LlmConfig {
    let mut llm = LlmConfig::default();
    llm.selection
        .defaults
        .insert("deep_reasoning".into(), "primary/model-a".into());
    llm.selection.fallbacks.insert(
        "deep_reasoning".into(),
        vec![
            "backup/model-b".into(),
            "local/rule-based".into(),
            "rule_based".into(),
        ],
    );
    llm
}

fn request(agent_id: &str, task: TaskType) -> LlmRequest {
    LlmRequest {
        prompt: "verify the hypothesis about recent commits".into(),
        task_type: task,
        agent_id: agent_id.into(),
        max_tokens: Some(256),
        temperature: Some(0.1),
        context_size: 2_000,
        use_cache: true,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fallback chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn fallback_walks_past_429_and_503_to_local() {
    let mut registry = ProviderRegistry::local_only();
    registry.insert(
        "primary",
        ScriptedProvider::new("primary", vec![ScriptedProvider::http_error("primary", 429)]),
    );
    registry.insert(
        "backup",
        ScriptedProvider::new("backup", vec![ScriptedProvider::http_error("backup", 503)]),
    );

    let orchestrator = LlmOrchestrator::new(&chain_config(), Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    let outcome = orchestrator
        .complete(&cancel, &budget, &request("inference", TaskType::DeepReasoning))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "local");
    assert_eq!(outcome.model, "rule-based");
    assert!(outcome.reason.starts_with("fallback_2"), "reason was {}", outcome.reason);
    assert!(!outcome.rule_based);

    let decisions = budget.decisions();
    assert_eq!(decisions.len(), 3);
    assert!(decisions.iter().all(|d| d.agent_id == "inference"));
    assert_eq!(decisions[0].selected, "primary/model-a");
    assert_eq!(decisions[0].reason, "default_error_429");
    assert_eq!(decisions[1].selected, "backup/model-b");
    assert_eq!(decisions[1].reason, "fallback_1_error_503");
    assert_eq!(decisions[2].selected, "local/rule-based");
    assert!(decisions[2].reason.starts_with("fallback_2"));
}

#[tokio::test]
async fn exhausted_chain_without_sentinel_is_no_provider() {
    let mut llm = LlmConfig::default();
    llm.selection
        .defaults
        .insert("dedup".into(), "ghost/model-x".into());
    llm.selection.fallbacks.insert("dedup".into(), vec![]);

    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(ProviderRegistry::local_only()));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    let err = orchestrator
        .complete(&cancel, &budget, &request("dedup", TaskType::Dedup))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoProvider { .. }));

    let decisions = budget.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].selected, "none");
    assert_eq!(decisions[0].reason, "no_provider");
}

#[tokio::test]
async fn deterministic_sentinel_terminates_chain() {
    let mut llm = LlmConfig::default();
    llm.selection
        .defaults
        .insert("dedup".into(), "ghost/model-x".into());
    llm.selection
        .fallbacks
        .insert("dedup".into(), vec!["rule_based".into()]);

    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(ProviderRegistry::local_only()));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    let outcome = orchestrator
        .complete(&cancel, &budget, &request("dedup", TaskType::Dedup))
        .await
        .unwrap();
    assert!(outcome.rule_based);
    assert!(outcome.content.is_empty());
    assert_eq!(outcome.reason, "deterministic");

    let decisions = budget.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].selected, "local/rule-based");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache idempotence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn second_select_is_a_cache_hit_with_same_selection() {
    let mut registry = ProviderRegistry::local_only();
    registry.insert(
        "primary",
        ScriptedProvider::new("primary", vec![ScriptedProvider::ok("answer one")]),
    );

    let mut llm = chain_config();
    llm.budget.session = 100.0;
    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();
    let req = request("inference", TaskType::DeepReasoning);

    let first = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert!(!first.cache_hit);

    let second = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.reason, "cache_hit");
    assert_eq!((second.provider.as_str(), second.model.as_str()),
               (first.provider.as_str(), first.model.as_str()));
    assert_eq!(second.content, first.content);
    assert_eq!(second.cost_usd, 0.0);

    let decisions = budget.decisions();
    assert_eq!(decisions.last().unwrap().reason, "cache_hit");
}

#[tokio::test]
async fn cache_hit_survives_primary_fallback() {
    // First call falls back to the local provider; the repeat must
    // return the same (provider, model) from cache even though the
    // fingerprint is keyed on the nominal default.
    let mut registry = ProviderRegistry::local_only();
    registry.insert(
        "primary",
        ScriptedProvider::new("primary", vec![ScriptedProvider::http_error("primary", 500)]),
    );
    registry.insert("backup", ScriptedProvider::new("backup", vec![ScriptedProvider::ok("b")]));

    let orchestrator = LlmOrchestrator::new(&chain_config(), Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();
    let req = request("inference", TaskType::DeepReasoning);

    let first = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert_eq!(first.provider, "backup");

    let second = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.provider, "backup");
    assert_eq!(second.model, "model-b");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget enforcement
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn exhausted_budget_fails_non_critical_but_not_critical_agents() {
    let mut llm = LlmConfig::default();
    llm.budget.session = 0.01;

    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(ProviderRegistry::local_only()));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    // Burn past the session budget (2000 tokens of gpt-4o = $0.025).
    budget.track_usage(
        &sq_orchestrator::ProfileTable::builtin(),
        "planner",
        "openai/gpt-4o",
        2000,
    );

    let err = orchestrator
        .complete(&cancel, &budget, &request("planner", TaskType::SimpleInference))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { ref scope, .. } if scope == "session"));
    assert_eq!(budget.decisions().last().unwrap().reason, "budget_exhausted_session");

    // Critical agents bypass the cap entirely.
    let outcome = orchestrator
        .complete(&cancel, &budget, &request("validator", TaskType::Validation))
        .await
        .unwrap();
    assert!(!outcome.cache_hit);
}

#[tokio::test]
async fn warning_threshold_downgrades_next_selection() {
    let mut llm = chain_config();
    llm.budget.session = 0.025;
    llm.budget.warning_threshold = 0.8;

    let mut registry = ProviderRegistry::local_only();
    registry.insert("primary", ScriptedProvider::new("primary", vec![]));
    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    // Spend past the warning threshold (0.8 × 0.025 = 0.02) while
    // staying under the budget itself: 1700 tokens of gpt-4o = 0.02125.
    budget.track_usage(
        &sq_orchestrator::ProfileTable::builtin(),
        "inference",
        "openai/gpt-4o",
        1700,
    );
    assert!(budget.in_warning());

    let mut req = request("inference", TaskType::DeepReasoning);
    req.use_cache = false;
    let outcome = orchestrator.complete(&cancel, &budget, &req).await.unwrap();

    // Cheapest fitting profile is the free local model.
    assert_eq!(outcome.reason, "budget_downgrade");
    assert_eq!(outcome.provider, "local");
    assert_eq!(budget.decisions().last().unwrap().reason, "budget_downgrade");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context-limit gate + rate-limit updates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn oversized_context_skips_small_models() {
    let mut llm = LlmConfig::default();
    // Give the local model a tiny context window so only gpt-4o fits.
    llm.profiles.insert(
        "local/rule-based".into(),
        sq_domain::config::ModelProfileOverride {
            context_limit: Some(1_000),
            ..Default::default()
        },
    );
    llm.selection
        .defaults
        .insert("dedup".into(), "local/rule-based".into());
    llm.selection
        .fallbacks
        .insert("dedup".into(), vec!["primary/model-a".into()]);

    let mut registry = ProviderRegistry::local_only();
    registry.insert("primary", ScriptedProvider::new("primary", vec![]));
    let orchestrator = LlmOrchestrator::new(&llm, Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();

    let mut req = request("dedup", TaskType::Dedup);
    req.context_size = 50_000;
    let outcome = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert_eq!(outcome.provider, "primary");
    assert!(outcome.reason.starts_with("fallback_1"));
}

#[tokio::test]
async fn reset_session_preserves_cache() {
    let mut registry = ProviderRegistry::local_only();
    registry.insert("primary", ScriptedProvider::new("primary", vec![]));
    let orchestrator = LlmOrchestrator::new(&chain_config(), Arc::new(registry));
    let budget = orchestrator.session_budget();
    let cancel = CancellationToken::new();
    let req = request("inference", TaskType::DeepReasoning);

    orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert_eq!(orchestrator.cache().len(), 1);

    budget.reset_session();
    assert!(budget.decisions().is_empty());
    assert_eq!(orchestrator.cache().len(), 1, "cache survives session reset");

    let outcome = orchestrator.complete(&cancel, &budget, &req).await.unwrap();
    assert!(outcome.cache_hit);
}
