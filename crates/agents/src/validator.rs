use chrono::Utc;
use sq_context::{
    AgentContext, DependencyGraph, DiagnosticEntry, Namespace, ValidationReport,
};
use sq_domain::error::Result;
use sq_domain::trace::TraceEvent;
use sq_pipeline::{Agent, AgentCapabilities};
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Critical agent: checks the reasoning artifact's structural
/// invariants and repairs the hypothesis graph when it cycles.
///
/// Checks: evidence references resolve in enrichment, the hypothesis
/// graph is acyclic (breaking cycles and recording a `dependency-cycle`
/// error when not), and confidences stay within [0, 1].
pub struct ValidatorAgent;

impl ValidatorAgent {
    pub fn new() -> Self {
        Self
    }

    fn check_evidence(ctx: &AgentContext) -> ValidationReport {
        let mut dangling = Vec::new();
        for conclusion in &ctx.reasoning.conclusions {
            for reference in &conclusion.evidence {
                if !ctx.enrichment.resolves(reference) {
                    dangling.push(format!("{}: {reference}", conclusion.id));
                }
            }
        }
        ValidationReport {
            check: "evidence-resolution".into(),
            passed: dangling.is_empty(),
            details: dangling,
        }
    }

    fn check_confidence_ranges(ctx: &AgentContext) -> ValidationReport {
        let mut out_of_range = Vec::new();
        let mut probe = |what: String, value: f64| {
            if !(0.0..=1.0).contains(&value) {
                out_of_range.push(format!("{what} = {value}"));
            }
        };
        for intent in &ctx.reasoning.intents {
            probe(format!("intent:{}", intent.kind), intent.confidence);
        }
        for fact in &ctx.enrichment.facts {
            probe(format!("fact:{}", fact.id), fact.confidence);
        }
        for conclusion in &ctx.reasoning.conclusions {
            probe(format!("conclusion:{}", conclusion.id), conclusion.confidence);
        }
        ValidationReport {
            check: "confidence-range".into(),
            passed: out_of_range.is_empty(),
            details: out_of_range,
        }
    }

    fn check_and_repair_graph(ctx: &mut AgentContext) -> ValidationReport {
        // Rebuild from the hypotheses so stale graphs cannot hide a
        // cycle.
        let mut graph = DependencyGraph::from_hypotheses(&ctx.reasoning.hypotheses);
        let breaks = graph.break_cycles();

        for broken in &breaks {
            let mut members = broken.members.clone();
            members.sort();
            ctx.diagnostics.errors.push(DiagnosticEntry {
                timestamp: Utc::now(),
                agent_id: "validator".into(),
                code: "dependency-cycle".into(),
                message: format!(
                    "hypothesis cycle broken by removing {} -> {}",
                    broken.removed_from, broken.removed_to
                ),
                details: members.clone(),
            });
            TraceEvent::CycleBroken {
                session_id: ctx.metadata.session_id.clone(),
                members,
                removed_edge_from: broken.removed_from.clone(),
                removed_edge_to: broken.removed_to.clone(),
            }
            .emit();
        }

        let acyclic = graph.find_cycle().is_none();
        ctx.reasoning.dependency_graph = graph;

        ValidationReport {
            check: "hypothesis-graph-acyclic".into(),
            passed: acyclic,
            details: breaks
                .iter()
                .map(|b| format!("removed {} -> {}", b.removed_from, b.removed_to))
                .collect(),
        }
    }
}

impl Default for ValidatorAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for ValidatorAgent {
    fn id(&self) -> &str {
        "validator"
    }

    fn postconditions(&self) -> &[&str] {
        &["diagnostics.validation"]
    }

    fn write_namespaces(&self) -> Vec<Namespace> {
        // Graph repair rewrites reasoning.dependency_graph.
        vec![Namespace::Diagnostics, Namespace::Reasoning]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            estimated_duration_ms: 10,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let reports = vec![
            Self::check_evidence(&ctx),
            Self::check_and_repair_graph(&mut ctx),
            Self::check_confidence_ranges(&ctx),
        ];

        for report in &reports {
            if !report.passed {
                tracing::warn!(check = %report.check, details = ?report.details, "validation failed");
            }
        }
        ctx.diagnostics.validation = reports;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sq_context::{Conclusion, Fact, Hypothesis, IntentKind};

    fn hyp(id: &str, deps: &[&str]) -> Hypothesis {
        Hypothesis {
            id: id.into(),
            description: format!("hypothesis {id}"),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn all_checks_pass_on_consistent_context() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.enrichment.facts.push(Fact {
            id: "f1".into(),
            content: "x".into(),
            source: "gitlab".into(),
            timestamp: Utc::now(),
            confidence: 0.9,
            provenance: [("k".to_string(), "v".to_string())].into(),
        });
        ctx.reasoning.hypotheses = vec![hyp("h0", &[]), hyp("h1", &["h0"])];
        ctx.reasoning.conclusions.push(Conclusion {
            id: "c0".into(),
            description: "d".into(),
            confidence: 0.9,
            evidence: vec!["fact:f1".into()],
            intent: IntentKind::QueryCommits,
        });

        let ctx = ValidatorAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();

        assert_eq!(ctx.diagnostics.validation.len(), 3);
        assert!(ctx.diagnostics.validation.iter().all(|r| r.passed));
        assert!(ctx.diagnostics.errors.is_empty());
    }

    #[tokio::test]
    async fn cycle_is_reported_and_broken() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.reasoning.hypotheses = vec![
            hyp("h0", &["h1"]),
            hyp("h1", &["h2"]),
            hyp("h2", &["h0"]),
        ];
        ctx.reasoning.dependency_graph =
            DependencyGraph::from_hypotheses(&ctx.reasoning.hypotheses);

        let ctx = ValidatorAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();

        // The dependency-cycle error names all members.
        let cycle_error = ctx
            .diagnostics
            .errors
            .iter()
            .find(|e| e.code == "dependency-cycle")
            .expect("cycle error recorded");
        assert_eq!(cycle_error.details, vec!["h0", "h1", "h2"]);

        // Post-break detection finds no cycle and the report passes.
        assert!(ctx.reasoning.dependency_graph.find_cycle().is_none());
        let graph_report = ctx
            .diagnostics
            .validation
            .iter()
            .find(|r| r.check == "hypothesis-graph-acyclic")
            .unwrap();
        assert!(graph_report.passed);
        assert!(!graph_report.details.is_empty(), "edge removal recorded");
    }

    #[tokio::test]
    async fn dangling_evidence_fails_resolution_check() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.reasoning.conclusions.push(Conclusion {
            id: "c0".into(),
            description: "d".into(),
            confidence: 0.9,
            evidence: vec!["fact:missing".into()],
            intent: IntentKind::QueryCommits,
        });

        let ctx = ValidatorAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();
        let report = ctx
            .diagnostics
            .validation
            .iter()
            .find(|r| r.check == "evidence-resolution")
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.details, vec!["c0: fact:missing"]);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_flagged() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.reasoning.conclusions.push(Conclusion {
            id: "c0".into(),
            description: "d".into(),
            confidence: 1.7,
            evidence: vec![],
            intent: IntentKind::Unknown,
        });

        let ctx = ValidatorAgent::new()
            .execute(&CancellationToken::new(), ctx)
            .await
            .unwrap();
        let report = ctx
            .diagnostics
            .validation
            .iter()
            .find(|r| r.check == "confidence-range")
            .unwrap();
        assert!(!report.passed);
    }
}
