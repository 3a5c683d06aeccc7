//! End-to-end pipeline runs over the full built-in agent set: the
//! happy-path commits query and budget exhaustion with critical-agent
//! override.

use sq_agents::{apply_outcome, default_registry, estimate_tokens};
use sq_context::{AgentContext, IntentKind, Namespace, RunStatus};
use sq_domain::config::{AgentSpec, LlmConfig, PipelineConfig, PipelineMode};
use sq_domain::error::Result;
use sq_orchestrator::{LlmOrchestrator, LlmRequest, ProfileTable, TaskType};
use sq_pipeline::{Agent, PipelineManager};
use sq_providers::{ProviderRegistry, StaticDatasource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn seeded_datasource() -> Arc<StaticDatasource> {
    let ds = Arc::new(StaticDatasource::new());
    ds.seed(
        "gitlab",
        "c-101",
        "commit c-101",
        "gitlab-mcp: fix flaky pipeline trigger",
    );
    ds.seed(
        "gitlab",
        "c-102",
        "commit c-102",
        "gitlab-mcp: add commit pagination to the client",
    );
    ds.seed(
        "gitlab",
        "c-103",
        "commit c-103",
        "gitlab-mcp: document the retry policy",
    );
    ds
}

fn orchestrator(llm: &LlmConfig) -> Arc<LlmOrchestrator> {
    Arc::new(LlmOrchestrator::new(
        llm,
        Arc::new(ProviderRegistry::local_only()),
    ))
}

fn full_pipeline() -> PipelineConfig {
    let agent = |id: &str| AgentSpec {
        id: id.into(),
        enabled: true,
        timeout_ms: 10_000,
        retry: 0,
        depends_on: vec![],
        condition: None,
    };
    PipelineConfig {
        mode: PipelineMode::Sequential,
        agents: [
            "intent",
            "structure",
            "planner",
            "executor",
            "synthesizer",
            "inference",
            "validator",
            "summarizer",
        ]
        .into_iter()
        .map(agent)
        .collect(),
        options: Default::default(),
    }
}

fn session(query: &str) -> AgentContext {
    let mut ctx = AgentContext::new("e2e-session", "e2e-trace");
    ctx.metadata.query = Some(query.into());
    ctx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Happy path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_path_commits_query() {
    let llm = LlmConfig::default();
    let registry = default_registry(orchestrator(&llm), seeded_datasource());
    let manager = PipelineManager::new(Arc::new(registry));

    let outcome = manager
        .run(
            &CancellationToken::new(),
            "full",
            &full_pipeline(),
            session("show me recent commits in project gitlab-mcp last week"),
        )
        .await;
    assert!(outcome.error.is_none());
    let ctx = outcome.context;

    // Intent classification.
    let top = &ctx.reasoning.intents[0];
    assert_eq!(top.kind, IntentKind::QueryCommits);
    assert!(top.confidence >= 0.7);
    assert_eq!(ctx.reasoning.entities["projects"], vec!["gitlab-mcp"]);
    assert_eq!(ctx.reasoning.entities["dates"], vec!["last week"]);

    // Retrieval planning.
    assert_eq!(ctx.retrieval.plans.len(), 1);
    assert_eq!(ctx.retrieval.plans[0].sources, vec!["gitlab"]);
    assert_eq!(ctx.retrieval.plans[0].priority, 10);

    // Retrieval + enrichment.
    assert_eq!(ctx.retrieval.artifacts.len(), 3);
    assert_eq!(ctx.enrichment.facts.len(), 3);

    // Conclusions with resolvable evidence.
    assert!(!ctx.reasoning.conclusions.is_empty());
    let best = ctx
        .reasoning
        .conclusions
        .iter()
        .map(|c| c.confidence)
        .fold(f64::MIN, f64::max);
    assert!(best >= 0.9, "best conclusion confidence {best}");
    assert!(ctx
        .reasoning
        .conclusions
        .iter()
        .all(|c| !c.evidence.is_empty() && c.evidence.iter().all(|e| ctx.enrichment.resolves(e))));

    // Validation all-pass.
    assert!(!ctx.diagnostics.validation.is_empty());
    assert!(ctx.diagnostics.validation.iter().all(|r| r.passed));

    // Summary names the intent kind and the source.
    let summary = ctx.reasoning.summary.as_deref().unwrap();
    assert!(summary.contains("query_commits"), "summary: {summary}");
    assert!(summary.contains("gitlab"), "summary: {summary}");

    // Every successful run satisfied its postconditions; all eight ran.
    assert_eq!(ctx.audit.agent_runs.len(), 8);
    assert!(ctx
        .audit
        .agent_runs
        .iter()
        .all(|r| r.status == RunStatus::Success));

    // Three facts fired the inference heuristic against the local
    // sentinel chain, so decisions were recorded.
    assert!(!ctx.llm.decisions.is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget exhaustion with critical-agent override
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM-needing agent that does NOT trap budget errors: they
/// propagate and fail its run.
struct Correlator {
    orchestrator: Arc<LlmOrchestrator>,
}

#[async_trait::async_trait]
impl Agent for Correlator {
    fn id(&self) -> &str {
        "correlator"
    }

    fn preconditions(&self) -> &[&str] {
        &["enrichment.facts"]
    }

    fn write_namespaces(&self) -> Vec<Namespace> {
        vec![Namespace::Llm]
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let prompt = format!("correlate {} facts", ctx.enrichment.facts.len());
        let request = LlmRequest {
            context_size: estimate_tokens(&prompt),
            prompt,
            task_type: TaskType::MultiSourceCorrelation,
            agent_id: "correlator".into(),
            max_tokens: Some(128),
            temperature: Some(0.0),
            use_cache: false,
        };
        let budget = self.orchestrator.budget_for(&ctx.metadata.session_id);
        let outcome = self.orchestrator.complete(cancel, &budget, &request).await?;
        apply_outcome(&mut ctx, "correlator", &outcome, &budget);
        Ok(ctx)
    }
}

#[tokio::test]
async fn budget_exhaustion_fails_non_critical_and_spares_critical() {
    let mut llm = LlmConfig::default();
    llm.budget.session = 0.01;

    let orch = orchestrator(&llm);
    let mut registry = default_registry(orch.clone(), seeded_datasource());
    registry.register(Arc::new(Correlator {
        orchestrator: orch.clone(),
    }));
    let manager = PipelineManager::new(Arc::new(registry));

    // The first (imagined) expensive call already blew the budget.
    orch.budget_for("e2e-session").track_usage(
        &ProfileTable::builtin(),
        "planner",
        "openai/gpt-4o",
        2_000,
    );

    let mut config = full_pipeline();
    config.agents.insert(
        6,
        AgentSpec {
            id: "correlator".into(),
            enabled: true,
            timeout_ms: 10_000,
            retry: 0,
            depends_on: vec![],
            condition: None,
        },
    );

    let outcome = manager
        .run(
            &CancellationToken::new(),
            "full",
            &config,
            session("show me recent commits in project gitlab-mcp last week"),
        )
        .await;
    assert!(outcome.error.is_none(), "pipeline continues past the failure");
    let ctx = outcome.context;

    // The non-trapping LLM agent failed with the budget reason.
    let failed = ctx
        .audit
        .agent_runs
        .iter()
        .find(|r| r.agent_id == "correlator")
        .unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("budget"));

    // The trapping inference agent degraded to its rule-based path.
    let inference = ctx
        .audit
        .agent_runs
        .iter()
        .find(|r| r.agent_id == "inference")
        .unwrap();
    assert_eq!(inference.status, RunStatus::Success);
    assert!(ctx
        .diagnostics
        .warnings
        .iter()
        .any(|w| w.code == "llm-unavailable"));
    assert!(!ctx.reasoning.conclusions.is_empty());

    // Critical agents still succeeded.
    for critical in ["validator", "summarizer"] {
        let run = ctx
            .audit
            .agent_runs
            .iter()
            .find(|r| r.agent_id == critical)
            .unwrap();
        assert_eq!(run.status, RunStatus::Success, "{critical} must succeed");
    }

    // Budget-refusal decisions were logged for the session.
    assert!(ctx
        .llm
        .decisions
        .iter()
        .any(|d| d.reason.starts_with("budget_exhausted")));

    orch.drop_session("e2e-session");
}
