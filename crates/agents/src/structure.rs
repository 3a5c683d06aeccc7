use sq_context::{AgentContext, DependencyGraph, Hypothesis};
use sq_domain::error::Result;
use sq_pipeline::{Agent, AgentCapabilities};
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hypothesis structuring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builds the hypothesis set and its dependency graph from actionable
/// intents (below-threshold intents generate nothing).
///
/// One hypothesis per actionable intent, plus a synthesis hypothesis
/// depending on all of them when there is more than one.
pub struct StructureAgent;

impl StructureAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructureAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for StructureAgent {
    fn id(&self) -> &str {
        "structure"
    }

    fn preconditions(&self) -> &[&str] {
        &["reasoning.intents"]
    }

    fn postconditions(&self) -> &[&str] {
        &["reasoning.hypotheses", "reasoning.dependency_graph"]
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
        let mut hypotheses: Vec<Hypothesis> = Vec::new();

        for (idx, intent) in ctx
            .reasoning
            .intents
            .iter()
            .filter(|i| i.is_actionable())
            .enumerate()
        {
            hypotheses.push(Hypothesis {
                id: format!("h{idx}"),
                description: format!(
                    "the '{}' request can be answered from retrievable records",
                    intent.kind
                ),
                dependencies: Vec::new(),
            });
        }

        if hypotheses.len() > 1 {
            let deps: Vec<String> = hypotheses.iter().map(|h| h.id.clone()).collect();
            hypotheses.push(Hypothesis {
                id: format!("h{}", hypotheses.len()),
                description: "the per-intent findings compose into one coherent answer".into(),
                dependencies: deps,
            });
        }

        ctx.reasoning.dependency_graph = DependencyGraph::from_hypotheses(&hypotheses);
        ctx.reasoning.hypotheses = hypotheses;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
