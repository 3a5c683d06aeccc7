use chrono::Utc;
use sq_context::{AgentContext, Artifact, DiagnosticEntry};
use sq_domain::error::{Error, Result};
use sq_pipeline::{Agent, AgentCapabilities};
use sq_providers::DatasourceClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs retrieval plans against the configured datasource, highest
/// priority first. Fetch failures on one source degrade to a recorded
/// warning; cancellation aborts the run.
pub struct ExecutorAgent {
    datasource: Arc<dyn DatasourceClient>,
}

impl ExecutorAgent {
    pub fn new(datasource: Arc<dyn DatasourceClient>) -> Self {
        Self { datasource }
    }
}

#[async_trait::async_trait]
impl Agent for ExecutorAgent {
    fn id(&self) -> &str {
        "executor"
    }

    fn preconditions(&self) -> &[&str] {
        &["retrieval.plans"]
    }

    fn postconditions(&self) -> &[&str] {
        &["retrieval.artifacts"]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            deterministic: false,
            estimated_duration_ms: 500,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let mut artifacts: Vec<Artifact> = Vec::new();

        for plan in &ctx.retrieval.plans {
            let queries: Vec<_> = ctx
                .retrieval
                .queries
                .iter()
                .filter(|q| q.plan_id == plan.id)
                .collect();

            for query in queries {
                let fetched = self
                    .datasource
                    .fetch(cancel, &query.source, &query.query, &plan.filters)
                    .await;

                let records = match fetched {
                    Ok(records) => records,
                    Err(err @ Error::Cancelled(_)) => return Err(err),
                    Err(err) => {
                        ctx.diagnostics.warnings.push(DiagnosticEntry {
                            timestamp: Utc::now(),
                            agent_id: "executor".into(),
                            code: "datasource-fetch-failed".into(),
                            message: err.to_string(),
                            details: vec![query.source.clone()],
                        });
                        continue;
                    }
                };

                for record in records {
                    if artifacts.iter().any(|a| a.id == record.id) {
                        continue;
                    }
                    artifacts.push(Artifact {
                        id: record.id,
                        label: record.label,
                        source: Some(record.source),
                        payload: Some(record.payload),
                        storage_ref: None,
                        external: false,
                    });
                }
            }
        }

        tracing::debug!(artifacts = artifacts.len(), "retrieval executed");
        ctx.retrieval.artifacts = artifacts;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
