//! AppState construction shared by `serve` and any future CLI commands
//! that need the full runtime without an HTTP listener.

use anyhow::Context;
use sq_agents::default_registry;
use sq_context::MemoryArtifactStore;
use sq_domain::config::Config;
use sq_orchestrator::LlmOrchestrator;
use sq_pipeline::PipelineManager;
use sq_providers::{ProviderRegistry, StaticDatasource};
use std::sync::Arc;
use std::time::Instant;

use crate::state::AppState;

/// Initialize every subsystem and return a fully-wired [`AppState`].
pub async fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let config = Arc::new(config);

    // ── Provider clients ─────────────────────────────────────────────
    let providers =
        Arc::new(ProviderRegistry::from_config(&config).context("initializing provider clients")?);
    tracing::info!(providers = providers.len(), "provider registry ready");

    // ── LLM orchestrator ─────────────────────────────────────────────
    let orchestrator = Arc::new(LlmOrchestrator::new(&config.llm, providers));
    tracing::info!(
        session_budget_usd = config.llm.budget.session,
        cache_enabled = config.llm.cache.enabled,
        "llm orchestrator ready"
    );

    // ── Datasources ──────────────────────────────────────────────────
    // Single-process deployments run against the fixture store; a
    // remote datasource client slots in behind the same trait.
    let datasource = Arc::new(StaticDatasource::new());
    seed_demo_records(&datasource);
    tracing::info!(
        gitlab_records = datasource.record_count("gitlab"),
        "datasource ready"
    );

    // ── Agents + pipeline manager ────────────────────────────────────
    let registry = Arc::new(default_registry(orchestrator.clone(), datasource));
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let manager = Arc::new(
        PipelineManager::new(registry.clone()).with_artifact_store(artifacts.clone()),
    );
    tracing::info!(agents = registry.len(), "pipeline manager ready");

    Ok(AppState {
        config,
        orchestrator,
        manager,
        artifacts,
        started_at: Instant::now(),
    })
}

fn seed_demo_records(datasource: &StaticDatasource) {
    datasource.seed(
        "gitlab",
        "c-101",
        "commit c-101",
        "gitlab-mcp: fix flaky pipeline trigger",
    );
    datasource.seed(
        "gitlab",
        "c-102",
        "commit c-102",
        "gitlab-mcp: add commit pagination to the client",
    );
    datasource.seed(
        "gitlab",
        "i-17",
        "issue i-17",
        "gitlab-mcp: retry loop starves the worker pool",
    );
    datasource.seed(
        "docs",
        "d-1",
        "doc d-1",
        "pipeline triggers run on push and merge events",
    );
}
