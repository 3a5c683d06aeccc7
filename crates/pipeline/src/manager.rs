use crate::agent::Agent;
use crate::condition::Condition;
use crate::registry::AgentRegistry;
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use sq_context::{
    diff as compute_diff, AgentContext, AgentMetrics, AgentRun, ArtifactStore, ContextDiff,
    ContextValidator, DiagnosticEntry, Namespace, RunStatus, SizeChecker, SizeLimits,
};
use sq_domain::config::{AgentSpec, PipelineConfig, PipelineMode, PipelineOptions};
use sq_domain::error::{Error, Result};
use sq_domain::trace::TraceEvent;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The pipeline always returns a context; fatal errors and cancellation
/// ride alongside the partial context instead of replacing it.
pub struct PipelineOutcome {
    pub context: AgentContext,
    pub error: Option<Error>,
}

impl PipelineOutcome {
    fn ok(context: AgentContext) -> Self {
        Self {
            context,
            error: None,
        }
    }

    fn fatal(context: AgentContext, error: Error) -> Self {
        Self {
            context,
            error: Some(error),
        }
    }
}

/// Per-agent execution states. `Failed` with retry budget remaining
/// transitions back through another attempt; everything else is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl StepState {
    fn run_status(self) -> RunStatus {
        match self {
            StepState::Succeeded => RunStatus::Success,
            StepState::Failed | StepState::TimedOut => RunStatus::Failed,
            StepState::Skipped => RunStatus::Skipped,
        }
    }
}

struct StepResult {
    agent_id: String,
    state: StepState,
    /// The agent's returned context (success only).
    context: Option<AgentContext>,
    diff: Option<ContextDiff>,
    error: Option<Error>,
    duration_ms: u64,
    completed_at: Instant,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Executes a configured pipeline over the shared agent registry.
///
/// All three modes obey the clone-and-merge discipline: agents receive
/// deep clones and their writes land via structural diffs, so audit
/// capture is race-free by construction even in parallel mode.
pub struct PipelineManager {
    registry: Arc<AgentRegistry>,
    validator: ContextValidator,
    size_checker: SizeChecker,
    artifact_store: Option<Arc<dyn ArtifactStore>>,
}

impl PipelineManager {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        let validator = registry.build_validator();
        Self {
            registry,
            validator,
            size_checker: SizeChecker::new(SizeLimits::default()),
            artifact_store: None,
        }
    }

    pub fn with_size_limits(mut self, limits: SizeLimits) -> Self {
        self.size_checker = SizeChecker::new(limits);
        self
    }

    /// Attach artifact storage; oversized payloads are externalized
    /// automatically after each successful agent run.
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifact_store = Some(store);
        self
    }

    /// Run a pipeline to completion (or first fatal error).
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        workflow: &str,
        config: &PipelineConfig,
        ctx: AgentContext,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let session_id = ctx.metadata.session_id.clone();
        TraceEvent::PipelineStarted {
            session_id: session_id.clone(),
            workflow: workflow.to_string(),
            mode: format!("{:?}", config.mode).to_lowercase(),
            agent_count: config.agents.len(),
        }
        .emit();

        let outcome = match config.mode {
            PipelineMode::Sequential | PipelineMode::Conditional => {
                self.run_ordered(cancel, config, ctx).await
            }
            PipelineMode::Parallel => self.run_parallel(cancel, config, ctx).await,
        };

        let runs = &outcome.context.audit.agent_runs;
        TraceEvent::PipelineFinished {
            session_id,
            succeeded: runs.iter().filter(|r| r.status == RunStatus::Success).count(),
            failed: runs.iter().filter(|r| r.status == RunStatus::Failed).count(),
            skipped: runs.iter().filter(|r| r.status == RunStatus::Skipped).count(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        outcome
    }

    // ── Sequential / conditional ───────────────────────────────────

    async fn run_ordered(
        &self,
        cancel: &CancellationToken,
        config: &PipelineConfig,
        ctx: AgentContext,
    ) -> PipelineOutcome {
        let conditional = config.mode == PipelineMode::Conditional;
        let mut current = ctx;

        for spec in &config.agents {
            if !spec.enabled {
                continue;
            }
            if cancel.is_cancelled() {
                return PipelineOutcome::fatal(
                    current,
                    Error::Cancelled("pipeline cancelled between agents".into()),
                );
            }

            let agent = match self.registry.get(&spec.id) {
                Ok(agent) => agent,
                Err(err) => return PipelineOutcome::fatal(current, err),
            };

            if conditional {
                if let Some(raw) = &spec.condition {
                    let condition = match Condition::parse(raw) {
                        Ok(c) => c,
                        Err(err) => return PipelineOutcome::fatal(current, err),
                    };
                    if !condition.eval(&current) {
                        record_skip(&mut current, &spec.id, &format!("condition '{raw}' false"));
                        continue;
                    }
                }
            }

            let mut result = self
                .run_step(cancel, spec, agent.as_ref(), &current, &config.options)
                .await;

            match result.state {
                StepState::Succeeded => {
                    let mut next = result.context.take().expect("success carries a context");
                    self.record_success(&mut next, &result, &config.options);
                    current = next;
                }
                _ => {
                    self.record_failure(&mut current, &result, &config.options);
                    let is_cancel = matches!(result.error, Some(Error::Cancelled(_)));
                    if is_cancel {
                        return PipelineOutcome::fatal(
                            current,
                            result.error.unwrap_or_else(|| Error::Cancelled("agent".into())),
                        );
                    }
                    if config.options.fail_on_violation {
                        let err = result
                            .error
                            .unwrap_or_else(|| Error::Other(format!("agent '{}' failed", spec.id)));
                        return PipelineOutcome::fatal(current, err);
                    }
                }
            }
        }

        PipelineOutcome::ok(current)
    }

    // ── Parallel (DAG) ─────────────────────────────────────────────

    async fn run_parallel(
        &self,
        cancel: &CancellationToken,
        config: &PipelineConfig,
        ctx: AgentContext,
    ) -> PipelineOutcome {
        let layers = match compute_layers(&config.agents) {
            Ok(layers) => layers,
            Err(err) => return PipelineOutcome::fatal(ctx, err),
        };

        let mut current = ctx;
        for layer in layers {
            if cancel.is_cancelled() {
                return PipelineOutcome::fatal(
                    current,
                    Error::Cancelled("pipeline cancelled between layers".into()),
                );
            }

            // Resolve the whole layer before dispatching any of it.
            let mut members = Vec::new();
            for spec in &layer {
                match self.registry.get(&spec.id) {
                    Ok(agent) => members.push((spec, agent)),
                    Err(err) => return PipelineOutcome::fatal(current, err),
                }
            }

            // Every member gets a clone of the merged pre-layer
            // baseline (dependencies completed in earlier layers).
            let baseline = current.clone();
            let futures = members.iter().map(|(spec, agent)| {
                let baseline = &baseline;
                async move {
                    self.run_step(cancel, spec, agent.as_ref(), baseline, &config.options)
                        .await
                }
            });
            let mut results = join_all(futures).await;

            // Merge in completion order so the audit trail mirrors
            // observable history.
            results.sort_by_key(|r| r.completed_at);

            let mut scalar_writes: HashSet<String> = HashSet::new();
            for result in results {
                match result.state {
                    StepState::Succeeded => {
                        let member_ctx = result.context.as_ref().expect("success carries context");
                        let diff = result.diff.as_ref().expect("success carries diff");
                        if let Err(err) = self.merge_member(
                            &mut current,
                            &baseline,
                            member_ctx,
                            diff,
                            &mut scalar_writes,
                        ) {
                            return PipelineOutcome::fatal(current, err);
                        }
                        self.record_success(&mut current, &result, &config.options);
                    }
                    _ => {
                        self.record_failure(&mut current, &result, &config.options);
                        let is_cancel = matches!(result.error, Some(Error::Cancelled(_)));
                        if is_cancel {
                            return PipelineOutcome::fatal(
                                current,
                                result
                                    .error
                                    .unwrap_or_else(|| Error::Cancelled("agent".into())),
                            );
                        }
                        if config.options.fail_on_violation {
                            let err = result.error.unwrap_or_else(|| {
                                Error::Other(format!("agent '{}' failed", result.agent_id))
                            });
                            return PipelineOutcome::fatal(current, err);
                        }
                    }
                }
            }
        }

        PipelineOutcome::ok(current)
    }

    /// Fold one member's changed slots into the merged context.
    /// Array-valued slots merge additively (elements new relative to
    /// the layer baseline); scalar slots are last-write-wins with a
    /// recorded warning on overlap.
    fn merge_member(
        &self,
        current: &mut AgentContext,
        baseline: &AgentContext,
        member: &AgentContext,
        diff: &ContextDiff,
        scalar_writes: &mut HashSet<String>,
    ) -> Result<()> {
        for path in diff.slots_written() {
            let Some((ns_str, key)) = path.split_once('.') else {
                continue;
            };
            let Some(ns) = Namespace::parse(ns_str) else {
                continue;
            };
            let member_val = member
                .slot_value(&path)
                .ok_or_else(|| Error::Other(format!("slot {path} missing from member context")))?;

            match member_val {
                Value::Array(member_items) => {
                    let base_items = match baseline.slot_value(&path) {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    let mut merged = match current.slot_value(&path) {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    for item in member_items {
                        if !base_items.contains(&item) && !merged.contains(&item) {
                            merged.push(item);
                        }
                    }
                    current.set_slot(ns, key, Value::Array(merged))?;
                }
                scalar => {
                    if !scalar_writes.insert(path.clone()) {
                        current.diagnostics.warnings.push(DiagnosticEntry {
                            timestamp: Utc::now(),
                            agent_id: diff.agent_id.clone(),
                            code: "parallel-write-overlap".into(),
                            message: format!("slot {path} written by more than one layer member"),
                            details: vec![path.clone()],
                        });
                    }
                    current.set_slot(ns, key, scalar)?;
                }
            }
        }
        Ok(())
    }

    // ── Single agent execution with retries ────────────────────────

    async fn run_step(
        &self,
        cancel: &CancellationToken,
        spec: &AgentSpec,
        agent: &dyn Agent,
        base: &AgentContext,
        options: &PipelineOptions,
    ) -> StepResult {
        let started = Instant::now();
        let session_id = base.metadata.session_id.clone();
        let fail = |state: StepState, error: Error, started: Instant| StepResult {
            agent_id: spec.id.to_string(),
            state,
            context: None,
            diff: None,
            error: Some(error),
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Instant::now(),
        };

        // Preconditions.
        if options.validate_contract {
            for slot in agent.preconditions() {
                if !base.slot_present(slot) {
                    return fail(
                        StepState::Failed,
                        Error::PreconditionMissing {
                            agent_id: spec.id.clone(),
                            slot: slot.to_string(),
                        },
                        started,
                    );
                }
            }
        }

        let capabilities = agent.capabilities();
        let timeout = Duration::from_millis(spec.timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return fail(
                    StepState::Failed,
                    Error::Cancelled(format!("agent '{}' cancelled before start", spec.id)),
                    started,
                );
            }

            TraceEvent::AgentStarted {
                session_id: session_id.clone(),
                agent_id: spec.id.clone(),
                attempt,
            }
            .emit();

            let attempt_error = match tokio::time::timeout(
                timeout,
                agent.execute(cancel, base.clone()),
            )
            .await
            {
                Ok(Ok(mut next)) => {
                    // Postconditions.
                    if options.validate_contract {
                        if let Some(missing) = agent
                            .postconditions()
                            .iter()
                            .find(|slot| !next.slot_present(slot))
                        {
                            return fail(
                                StepState::Failed,
                                Error::PostconditionMissing {
                                    agent_id: spec.id.clone(),
                                    slot: missing.to_string(),
                                },
                                started,
                            );
                        }
                    }

                    let diff = match compute_diff(base, &next, &spec.id) {
                        Ok(diff) => diff,
                        Err(err) => return fail(StepState::Failed, err, started),
                    };

                    if options.validate_contract {
                        if let Err(err) = self.validator.validate_diff(&spec.id, &diff) {
                            if let Error::ContextViolation {
                                ref namespace,
                                ref key,
                                ..
                            } = err
                            {
                                TraceEvent::ContextViolation {
                                    session_id: session_id.clone(),
                                    agent_id: spec.id.clone(),
                                    namespace: namespace.clone(),
                                    key: key.clone(),
                                }
                                .emit();
                            }
                            return fail(StepState::Failed, err, started);
                        }
                    }

                    // Size policy: externalize, then enforce.
                    if let Some(store) = &self.artifact_store {
                        if self.size_checker.should_externalize(&next) {
                            if let Err(err) = self.size_checker.externalize(&mut next, store.as_ref())
                            {
                                return fail(StepState::Failed, err, started);
                            }
                        }
                    }
                    if let Err(err) = self.size_checker.check(&next) {
                        return fail(StepState::Failed, err, started);
                    }

                    return StepResult {
                        agent_id: spec.id.clone(),
                        state: StepState::Succeeded,
                        context: Some(next),
                        diff: Some(diff),
                        error: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                        completed_at: Instant::now(),
                    };
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => Error::AgentTimeout {
                    agent_id: spec.id.clone(),
                    timeout_ms: spec.timeout_ms,
                },
            };

            if matches!(attempt_error, Error::Cancelled(_)) {
                return fail(StepState::Failed, attempt_error, started);
            }

            let timed_out = matches!(attempt_error, Error::AgentTimeout { .. });
            let can_retry =
                capabilities.retry_safe && attempt < spec.retry && attempt_error.is_retryable();
            if !can_retry {
                let state = if timed_out {
                    StepState::TimedOut
                } else {
                    StepState::Failed
                };
                return fail(state, attempt_error, started);
            }

            // Exponential backoff: 1 s, 2 s, 4 s, … capped at the
            // agent's timeout.
            let backoff = Duration::from_millis(
                (1000u64.saturating_mul(1u64 << attempt.min(16))).min(spec.timeout_ms),
            );
            TraceEvent::AgentRetry {
                session_id: session_id.clone(),
                agent_id: spec.id.clone(),
                attempt: attempt + 1,
                backoff_ms: backoff.as_millis() as u64,
                error: attempt_error.to_string(),
            }
            .emit();

            tokio::select! {
                _ = cancel.cancelled() => {
                    return fail(
                        StepState::Failed,
                        Error::Cancelled(format!("agent '{}' cancelled during backoff", spec.id)),
                        started,
                    );
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }

    // ── Audit capture ──────────────────────────────────────────────

    fn record_success(
        &self,
        ctx: &mut AgentContext,
        result: &StepResult,
        options: &PipelineOptions,
    ) {
        let diff = result.diff.as_ref();
        let keys_written = diff.map(ContextDiff::slots_written).unwrap_or_default();

        TraceEvent::AgentFinished {
            session_id: ctx.metadata.session_id.clone(),
            agent_id: result.agent_id.clone(),
            status: RunStatus::Success.to_string(),
            duration_ms: result.duration_ms,
            keys_written: keys_written.len(),
        }
        .emit();

        ctx.audit.agent_runs.push(AgentRun {
            timestamp: Utc::now(),
            agent_id: result.agent_id.clone(),
            status: RunStatus::Success,
            duration_ms: result.duration_ms,
            keys_written,
            error: None,
        });
        if let Some(diff) = diff {
            if !diff.is_empty() {
                ctx.audit.diffs.push(diff.clone());
            }
        }
        if options.track_performance {
            let entry = ctx
                .diagnostics
                .metrics
                .entry(result.agent_id.clone())
                .or_insert_with(AgentMetrics::default);
            entry.duration_ms = result.duration_ms;
        }
    }

    fn record_failure(
        &self,
        ctx: &mut AgentContext,
        result: &StepResult,
        options: &PipelineOptions,
    ) {
        let message = result
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown failure".into());

        TraceEvent::AgentFinished {
            session_id: ctx.metadata.session_id.clone(),
            agent_id: result.agent_id.clone(),
            status: result.state.run_status().to_string(),
            duration_ms: result.duration_ms,
            keys_written: 0,
        }
        .emit();

        ctx.audit.agent_runs.push(AgentRun {
            timestamp: Utc::now(),
            agent_id: result.agent_id.clone(),
            status: result.state.run_status(),
            duration_ms: result.duration_ms,
            keys_written: Vec::new(),
            error: Some(message.clone()),
        });
        ctx.diagnostics.errors.push(DiagnosticEntry {
            timestamp: Utc::now(),
            agent_id: result.agent_id.clone(),
            code: failure_code(result.error.as_ref()),
            message,
            details: Vec::new(),
        });
        if options.track_performance {
            let entry = ctx
                .diagnostics
                .metrics
                .entry(result.agent_id.clone())
                .or_insert_with(AgentMetrics::default);
            entry.duration_ms = result.duration_ms;
        }
    }
}

fn record_skip(ctx: &mut AgentContext, agent_id: &str, reason: &str) {
    ctx.audit.agent_runs.push(AgentRun {
        timestamp: Utc::now(),
        agent_id: agent_id.to_string(),
        status: StepState::Skipped.run_status(),
        duration_ms: 0,
        keys_written: Vec::new(),
        error: Some(reason.to_string()),
    });
}

fn failure_code(error: Option<&Error>) -> String {
    match error {
        Some(Error::ContextViolation { .. }) => "context-violation",
        Some(Error::ContextSize { .. }) => "context-size",
        Some(Error::PreconditionMissing { .. }) => "precondition-missing",
        Some(Error::PostconditionMissing { .. }) => "postcondition-missing",
        Some(Error::AgentTimeout { .. }) => "agent-timeout",
        Some(Error::BudgetExceeded { .. }) => "budget-exceeded",
        Some(Error::Cancelled(_)) => "cancelled",
        Some(Error::Provider { .. }) => "provider-error",
        _ => "agent-failure",
    }
    .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DAG layering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kahn layering over `depends_on`. Disabled agents are dropped (their
/// dependents treat them as satisfied). Cycles are fatal.
fn compute_layers(agents: &[AgentSpec]) -> Result<Vec<Vec<AgentSpec>>> {
    let enabled: Vec<&AgentSpec> = agents.iter().filter(|a| a.enabled).collect();
    let ids: HashSet<&str> = enabled.iter().map(|a| a.id.as_str()).collect();

    let mut remaining: HashMap<&str, &AgentSpec> =
        enabled.iter().map(|a| (a.id.as_str(), *a)).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let mut layer: Vec<&AgentSpec> = remaining
            .values()
            .filter(|spec| {
                spec.depends_on
                    .iter()
                    .all(|dep| done.contains(dep.as_str()) || !ids.contains(dep.as_str()))
            })
            .copied()
            .collect();

        if layer.is_empty() {
            let mut stuck: Vec<&str> = remaining.keys().copied().collect();
            stuck.sort_unstable();
            return Err(Error::Config(format!(
                "dependency cycle among agents: {}",
                stuck.join(", ")
            )));
        }

        // Declared order within a layer, for deterministic dispatch.
        layer.sort_by_key(|spec| {
            agents
                .iter()
                .position(|a| a.id == spec.id)
                .unwrap_or(usize::MAX)
        });

        for spec in &layer {
            done.insert(spec.id.as_str());
            remaining.remove(spec.id.as_str());
        }
        layers.push(layer.into_iter().cloned().collect());
    }

    Ok(layers)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, depends_on: &[&str]) -> AgentSpec {
        AgentSpec {
            id: id.into(),
            enabled: true,
            timeout_ms: 1000,
            retry: 0,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            condition: None,
        }
    }

    #[test]
    fn layers_for_diamond() {
        let agents = vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b", "c"]),
        ];
        let layers = compute_layers(&agents).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].iter().map(|s| &s.id).collect::<Vec<_>>(), ["a"]);
        assert_eq!(layers[1].iter().map(|s| &s.id).collect::<Vec<_>>(), ["b", "c"]);
        assert_eq!(layers[2].iter().map(|s| &s.id).collect::<Vec<_>>(), ["d"]);
    }

    #[test]
    fn dependency_cycle_is_fatal() {
        let agents = vec![spec("a", &["b"]), spec("b", &["a"])];
        let err = compute_layers(&agents).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn disabled_dependency_is_treated_as_satisfied() {
        let mut disabled = spec("a", &[]);
        disabled.enabled = false;
        let agents = vec![disabled, spec("b", &["a"])];
        let layers = compute_layers(&agents).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0][0].id, "b");
    }

    #[test]
    fn backoff_schedule_caps_at_timeout() {
        // 1s, 2s, 4s … capped; mirrored from the run_step arithmetic.
        let timeout_ms = 3000u64;
        let backoffs: Vec<u64> = (0u32..4)
            .map(|attempt| (1000u64.saturating_mul(1u64 << attempt.min(16))).min(timeout_ms))
            .collect();
        assert_eq!(backoffs, vec![1000, 2000, 3000, 3000]);
    }
}
