use sq_context::AgentContext;
use sq_domain::error::Result;
use sq_pipeline::{Agent, AgentCapabilities};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Critical agent: renders the deterministic session summary naming
/// the recognized intents, the sources consulted, and the conclusion
/// count. Always succeeds so a response exists even for degraded runs.
pub struct SummarizerAgent;

impl SummarizerAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SummarizerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for SummarizerAgent {
    fn id(&self) -> &str {
        "summarizer"
    }

    fn postconditions(&self) -> &[&str] {
        &["reasoning.summary"]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            estimated_duration_ms: 5,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let intents: Vec<String> = ctx
            .reasoning
            .intents
            .iter()
            .filter(|i| i.is_actionable())
            .map(|i| i.kind.to_string())
            .collect();
        let sources: BTreeSet<String> = ctx
            .retrieval
            .plans
            .iter()
            .flat_map(|p| p.sources.iter().cloned())
            .collect();

        let mut summary = String::new();
        if intents.is_empty() {
            summary.push_str("no actionable intent recognized");
        } else {
            summary.push_str(&format!("intents: {}", intents.join(", ")));
        }
        if !sources.is_empty() {
            summary.push_str(&format!(
                "; sources: {}",
                sources.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        summary.push_str(&format!(
            "; facts: {}; conclusions: {}",
            ctx.enrichment.facts.len(),
            ctx.reasoning.conclusions.len()
        ));
        if let Some(best) = ctx
            .reasoning
            .conclusions
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        {
            summary.push_str(&format!(
                "; best: {} ({:.2})",
                best.description, best.confidence
            ));
        }
        let failed_checks = ctx
            .diagnostics
            .validation
            .iter()
            .filter(|r| !r.passed)
            .count();
        if failed_checks > 0 {
            summary.push_str(&format!("; failed checks: {failed_checks}"));
        }

        ctx.reasoning.summary = Some(summary);
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
