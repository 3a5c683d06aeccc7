use sq_context::{AgentContext, IntentKind, RetrievalPlan, RetrievalQuery};
use sq_domain::error::Result;
use sq_pipeline::{Agent, AgentCapabilities};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval planning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Source routing and priority per intent kind. Record kinds (commits,
/// issues, …) are high-priority single-source fetches; conceptual
/// intents route to documentation at lower priority.
fn route(kind: IntentKind) -> Option<(Vec<&'static str>, u8)> {
    match kind {
        IntentKind::QueryCommits
        | IntentKind::QueryIssues
        | IntentKind::QueryMergeRequests
        | IntentKind::QueryPipelines
        | IntentKind::SearchCode => Some((vec!["gitlab"], 10)),
        IntentKind::SummarizeActivity => Some((vec!["gitlab"], 7)),
        IntentKind::ExplainConcept => Some((vec!["docs"], 5)),
        IntentKind::Unknown => None,
    }
}

/// Turns actionable intents into prioritized retrieval plans and
/// per-source queries. Intents below the planning threshold are
/// skipped entirely.
pub struct PlannerAgent;

impl PlannerAgent {
    pub fn new() -> Self {
        Self
    }

    fn filters_from_entities(entities: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, String> {
        let mut filters = BTreeMap::new();
        if let Some(project) = entities.get("projects").and_then(|p| p.first()) {
            filters.insert("project".to_string(), project.clone());
        }
        if let Some(date) = entities.get("dates").and_then(|d| d.first()) {
            filters.insert("date".to_string(), date.clone());
        }
        if let Some(author) = entities.get("authors").and_then(|a| a.first()) {
            filters.insert("author".to_string(), author.clone());
        }
        filters
    }
}

impl Default for PlannerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for PlannerAgent {
    fn id(&self) -> &str {
        "planner"
    }

    fn preconditions(&self) -> &[&str] {
        &["reasoning.intents"]
    }

    fn postconditions(&self) -> &[&str] {
        &["retrieval.plans"]
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
        let filters = Self::filters_from_entities(&ctx.reasoning.entities);
        let query = ctx.metadata.query.clone().unwrap_or_default();

        let mut plans = Vec::new();
        let mut queries = Vec::new();

        for intent in ctx.reasoning.intents.iter().filter(|i| i.is_actionable()) {
            let Some((sources, priority)) = route(intent.kind) else {
                continue;
            };
            let plan_id = format!("plan-{}", plans.len());
            for source in &sources {
                queries.push(RetrievalQuery {
                    plan_id: plan_id.clone(),
                    source: source.to_string(),
                    query: format!("{} {}", intent.kind, query.trim()),
                });
            }
            plans.push(RetrievalPlan {
                id: plan_id,
                intent: intent.kind,
                sources: sources.into_iter().map(str::to_string).collect(),
                priority,
                filters: filters.clone(),
            });
        }

        // Highest priority executes first.
        plans.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(plans = plans.len(), "retrieval planned");
        ctx.retrieval.plans = plans;
        ctx.retrieval.queries = queries;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sq_context::Intent;

    #[tokio::test]
    async fn commits_intent_plans_gitlab_at_priority_ten() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.metadata.query = Some("recent commits in project gitlab-mcp".into());
        ctx.reasoning.intents = vec![Intent {
            kind: IntentKind::QueryCommits,
            confidence: 0.8,
            entities: vec![],
        }];
        ctx.reasoning
            .entities
            .insert("projects".into(), vec!["gitlab-mcp".into()]);

        let ctx = PlannerAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();

        assert_eq!(ctx.retrieval.plans.len(), 1);
        let plan = &ctx.retrieval.plans[0];
        assert_eq!(plan.sources, vec!["gitlab"]);
        assert_eq!(plan.priority, 10);
        assert_eq!(plan.filters["project"], "gitlab-mcp");
        assert_eq!(ctx.retrieval.queries.len(), 1);
        assert!(ctx.retrieval.queries[0].query.contains("query_commits"));
    }

    #[tokio::test]
    async fn weak_intents_are_skipped() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.reasoning.intents = vec![
            Intent {
                kind: IntentKind::QueryCommits,
                confidence: 0.29,
                entities: vec![],
            },
            Intent {
                kind: IntentKind::Unknown,
                confidence: 0.9,
                entities: vec![],
            },
        ];

        let ctx = PlannerAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();
        assert!(ctx.retrieval.plans.is_empty(), "below-threshold and unroutable intents plan nothing");
    }

    #[tokio::test]
    async fn plans_ordered_by_priority() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.reasoning.intents = vec![
            Intent {
                kind: IntentKind::ExplainConcept,
                confidence: 0.8,
                entities: vec![],
            },
            Intent {
                kind: IntentKind::QueryCommits,
                confidence: 0.7,
                entities: vec![],
            },
        ];

        let ctx = PlannerAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();
        assert_eq!(ctx.retrieval.plans.len(), 2);
        assert_eq!(ctx.retrieval.plans[0].priority, 10);
        assert_eq!(ctx.retrieval.plans[1].priority, 5);
    }
}
