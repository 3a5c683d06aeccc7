use crate::budget::{BudgetTracker, UsageAggregate, UsageTotals};
use crate::cache::{fingerprint, CacheEntry, ResponseCache};
use crate::profiles::{split_model_key, ProfileTable};
use crate::task::{Candidate, SelectionStrategy, StrategyTable, TaskType};
use crate::throttle::Throttle;
use chrono::Utc;
use parking_lot::RwLock;
use sq_context::LlmDecision;
use sq_domain::config::LlmConfig;
use sq_domain::error::{Error, Result};
use sq_domain::trace::TraceEvent;
use sq_providers::{CallParams, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub task_type: TaskType,
    pub agent_id: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Prompt-side token estimate used for the context-limit gate.
    pub context_size: usize,
    pub use_cache: bool,
}

/// The result of one orchestrated completion.
#[derive(Debug, Clone)]
pub struct LlmOutcome {
    pub provider: String,
    pub model: String,
    pub reason: String,
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Cost charged to the session by this call (zero for cache hits
    /// and the sentinel).
    pub cost_usd: f64,
    pub cache_hit: bool,
    /// Selection ended on the deterministic sentinel: `content` is
    /// empty and the agent must run its rule-based path instead.
    pub rule_based: bool,
}

impl LlmOutcome {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide LLM orchestrator.
///
/// Selection walks the task type's candidate chain in order, enforcing
/// budget caps (with critical-agent overrides), the warning-threshold
/// downgrade, the per-candidate context-limit gate, and token-bucket
/// throttling, falling back past transient provider failures until the
/// chain's deterministic sentinel. Budget accumulators are per session
/// ([`BudgetTracker`]); cache, throttle and profiles are shared.
pub struct LlmOrchestrator {
    profiles: RwLock<Arc<ProfileTable>>,
    strategies: StrategyTable,
    throttle: Throttle,
    cache: ResponseCache,
    registry: Arc<ProviderRegistry>,
    aggregate: UsageAggregate,
    budget_config: sq_domain::config::BudgetConfig,
    /// Per-session budget trackers, dropped when the session ends.
    budgets: parking_lot::Mutex<std::collections::HashMap<String, Arc<BudgetTracker>>>,
}

impl LlmOrchestrator {
    pub fn new(llm: &LlmConfig, registry: Arc<ProviderRegistry>) -> Self {
        let profiles = ProfileTable::from_config(llm);
        let throttle = Throttle::from_profiles(&profiles);
        Self {
            profiles: RwLock::new(Arc::new(profiles)),
            strategies: StrategyTable::from_config(&llm.selection, &llm.default_model),
            throttle,
            cache: ResponseCache::from_config(&llm.cache),
            registry,
            aggregate: UsageAggregate::new(),
            budget_config: llm.budget.clone(),
            budgets: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// New per-session budget tracker under the configured policy.
    pub fn session_budget(&self) -> BudgetTracker {
        self.aggregate.record_session();
        BudgetTracker::from_config(&self.budget_config)
    }

    /// The budget tracker for a session id, created on first use.
    /// Agents resolve their session's tracker through this; the gateway
    /// calls [`LlmOrchestrator::drop_session`] when the session ends.
    pub fn budget_for(&self, session_id: &str) -> Arc<BudgetTracker> {
        let mut budgets = self.budgets.lock();
        if let Some(existing) = budgets.get(session_id) {
            return existing.clone();
        }
        self.aggregate.record_session();
        let tracker = Arc::new(BudgetTracker::from_config(&self.budget_config));
        budgets.insert(session_id.to_string(), tracker.clone());
        tracker
    }

    /// Discard a finished session's accumulators.
    pub fn drop_session(&self, session_id: &str) {
        self.budgets.lock().remove(session_id);
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn usage_totals(&self) -> UsageTotals {
        self.aggregate.snapshot()
    }

    /// Atomically publish a new rate limit for one `"provider/model"`
    /// key; 0 removes the bucket. The profile table is republished so
    /// later readers see the matching timeout.
    pub fn update_rate_limit(&self, key: &str, max_requests: u32, timeout_ms: u64) {
        self.throttle.update_rate_limit(key, max_requests, timeout_ms);
        let mut guard = self.profiles.write();
        let mut table = (**guard).clone();
        if let Some(mut profile) = table.get(key).cloned() {
            profile.max_requests_per_second = max_requests;
            profile.request_timeout_ms = timeout_ms;
            table.insert(key, profile);
        }
        *guard = Arc::new(table);
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Run the full selection algorithm and dispatch.
    pub async fn complete(
        &self,
        cancel: &CancellationToken,
        budget: &BudgetTracker,
        req: &LlmRequest,
    ) -> Result<LlmOutcome> {
        let profiles = self.profiles.read().clone();
        let mut strategy = self.strategies.for_task(req.task_type);

        // Fingerprint against the strategy's nominal default so a
        // repeat of the same request hits the same entry regardless of
        // which fallback actually served the first one.
        let nominal_model = strategy
            .candidates
            .first()
            .map(Candidate::decision_key)
            .unwrap_or("none")
            .to_string();
        let fp = fingerprint(
            &req.prompt,
            &nominal_model,
            req.max_tokens,
            req.temperature,
            req.task_type,
        );

        // 1. Cache short-circuit.
        if req.use_cache {
            if let Some(entry) = self.cache.get(&fp) {
                let (provider, model) = split_model_key(&entry.selected);
                self.record(budget, req, &entry.selected, "cache_hit");
                TraceEvent::LlmCacheHit {
                    agent_id: req.agent_id.clone(),
                    task_type: req.task_type.as_str().into(),
                    model: entry.selected.clone(),
                }
                .emit();
                return Ok(LlmOutcome {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    reason: "cache_hit".into(),
                    content: entry.response.clone(),
                    prompt_tokens: 0,
                    completion_tokens: entry.tokens.min(u64::from(u32::MAX)) as u32,
                    cost_usd: 0.0,
                    cache_hit: true,
                    rule_based: false,
                });
            }
        }

        // 2. Budget gates (critical agents bypass).
        if let Err(err) = budget.check(&req.agent_id) {
            if let Error::BudgetExceeded {
                ref scope,
                spent_usd,
                limit_usd,
                ..
            } = err
            {
                self.record(budget, req, "none", &format!("budget_exhausted_{scope}"));
                TraceEvent::BudgetExhausted {
                    agent_id: req.agent_id.clone(),
                    scope: scope.clone(),
                    spent_usd,
                    limit_usd,
                }
                .emit();
            }
            return Err(err);
        }

        // 3. Warning-threshold downgrade: swap the default for the
        // cheapest profile that still fits the context.
        let mut downgraded = false;
        if budget.in_warning() {
            if let Some((cheap_key, _)) = profiles.cheapest_fitting(req.context_size) {
                if !strategy.candidates.is_empty() {
                    strategy.candidates[0] = Candidate::Model(cheap_key.to_string());
                    downgraded = true;
                    TraceEvent::BudgetDowngrade {
                        agent_id: req.agent_id.clone(),
                        session_spent_usd: budget.session_spent(),
                        session_budget_usd: budget.session_budget(),
                        downgraded_to: cheap_key.to_string(),
                    }
                    .emit();
                }
            }
        }

        // 4. Walk the chain.
        for (idx, candidate) in strategy.candidates.iter().enumerate() {
            let label = if downgraded && idx == 0 {
                "budget_downgrade".to_string()
            } else {
                SelectionStrategy::slot_label(idx, candidate)
            };

            let key = match candidate {
                Candidate::RuleBased => {
                    // 5. Deterministic sentinel: the agent skips the
                    // LLM call and takes its rule-based path.
                    self.record(budget, req, candidate.decision_key(), &label);
                    let (provider, model) = split_model_key(candidate.decision_key());
                    return Ok(LlmOutcome {
                        provider: provider.to_string(),
                        model: model.to_string(),
                        reason: label,
                        content: String::new(),
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        cost_usd: 0.0,
                        cache_hit: false,
                        rule_based: true,
                    });
                }
                Candidate::Model(key) => key,
            };

            let profile = profiles.get(key);
            if let Some(p) = profile {
                if req.context_size > p.context_limit {
                    tracing::debug!(
                        model = %key,
                        context_size = req.context_size,
                        context_limit = p.context_limit,
                        "candidate skipped: context too large"
                    );
                    continue;
                }
            }
            let timeout = profile
                .map(|p| Duration::from_millis(p.request_timeout_ms))
                .unwrap_or_else(|| self.throttle.timeout_for(key));

            // Bounded throttle wait.
            match tokio::time::timeout(timeout, self.throttle.wait_for_token(cancel, key)).await
            {
                Err(_) => {
                    self.record(budget, req, key, &format!("{label}_throttle_timeout"));
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Ok(Ok(waited)) => {
                    if waited > Duration::from_millis(50) {
                        let (provider, model) = split_model_key(key);
                        TraceEvent::ThrottleWait {
                            provider: provider.to_string(),
                            model: model.to_string(),
                            waited_ms: waited.as_millis() as u64,
                        }
                        .emit();
                    }
                }
            }

            let (provider_name, model_name) = split_model_key(key);
            let Some(client) = self.registry.get(provider_name) else {
                tracing::warn!(provider = %provider_name, "provider not in registry, trying next candidate");
                continue;
            };

            let params = CallParams {
                max_tokens: req.max_tokens,
                temperature: req.temperature,
            };
            let dispatch = tokio::time::timeout(
                timeout,
                client.call(cancel, model_name, &req.prompt, params),
            )
            .await;

            match dispatch {
                Err(_) => {
                    self.record(budget, req, key, &format!("{label}_timeout"));
                    self.emit_fallback(req, key, "timeout");
                }
                Ok(Err(Error::Cancelled(msg))) => return Err(Error::Cancelled(msg)),
                Ok(Err(err)) => {
                    let status = match &err {
                        Error::Provider { status, .. } => *status,
                        _ => None,
                    };
                    let reason = match status {
                        Some(code) => format!("{label}_error_{code}"),
                        None => format!("{label}_error"),
                    };
                    self.record(budget, req, key, &reason);
                    self.emit_fallback(req, key, &err.to_string());
                }
                Ok(Ok(response)) => {
                    let tokens = response.total_tokens();
                    let cost = budget.track_usage(&profiles, &req.agent_id, key, tokens);
                    self.aggregate.record_request(tokens, cost);

                    self.record(budget, req, key, &label);
                    TraceEvent::LlmSelected {
                        agent_id: req.agent_id.clone(),
                        task_type: req.task_type.as_str().into(),
                        provider: provider_name.to_string(),
                        model: model_name.to_string(),
                        reason: label.clone(),
                    }
                    .emit();

                    if req.use_cache {
                        self.cache.put(
                            &fp,
                            CacheEntry {
                                response: response.content.clone(),
                                tokens,
                                cost,
                                task_type: req.task_type,
                                selected: key.clone(),
                                stored_at: std::time::Instant::now(),
                            },
                        );
                    }

                    return Ok(LlmOutcome {
                        provider: provider_name.to_string(),
                        model: model_name.to_string(),
                        reason: label,
                        content: response.content,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        cost_usd: cost,
                        cache_hit: false,
                        rule_based: false,
                    });
                }
            }
        }

        // 6. Chain exhausted without a sentinel.
        self.record(budget, req, "none", "no_provider");
        Err(Error::NoProvider {
            task_type: req.task_type.as_str().into(),
        })
    }

    fn record(&self, budget: &BudgetTracker, req: &LlmRequest, selected: &str, reason: &str) {
        budget.record_decision(LlmDecision {
            timestamp: Utc::now(),
            agent_id: req.agent_id.clone(),
            task_type: req.task_type.as_str().into(),
            selected: selected.to_string(),
            reason: reason.to_string(),
        });
    }

    fn emit_fallback(&self, req: &LlmRequest, from: &str, reason: &str) {
        TraceEvent::LlmFallback {
            agent_id: req.agent_id.clone(),
            task_type: req.task_type.as_str().into(),
            from_model: from.to_string(),
            to_model: "next_candidate".into(),
            reason: reason.to_string(),
        }
        .emit();
    }
}
