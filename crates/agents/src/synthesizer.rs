use chrono::Utc;
use sq_context::{AgentContext, Fact, Knowledge, Relationship};
use sq_domain::error::Result;
use sq_pipeline::{Agent, AgentCapabilities};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enrichment synthesis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ARTIFACT_FACT_CONFIDENCE: f64 = 0.9;

/// Distills retrieval artifacts into facts with provenance, rolls
/// per-source fact groups into derived knowledge, and records the
/// fact→knowledge support relationships.
pub struct SynthesizerAgent;

impl SynthesizerAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SynthesizerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for SynthesizerAgent {
    fn id(&self) -> &str {
        "synthesizer"
    }

    fn preconditions(&self) -> &[&str] {
        &["retrieval.artifacts"]
    }

    fn postconditions(&self) -> &[&str] {
        &["enrichment.facts"]
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
        let mut facts = Vec::new();
        let mut by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for artifact in &ctx.retrieval.artifacts {
            let source = artifact.source.clone().unwrap_or_else(|| "unknown".into());
            let content = match (&artifact.payload, artifact.external) {
                (Some(payload), _) => payload.clone(),
                // Externalized payloads stay out of the context; the
                // label is the fact surface.
                (None, true) => artifact.label.clone(),
                (None, false) => continue,
            };

            let fact_id = format!("f-{}", artifact.id);
            let mut provenance = BTreeMap::new();
            provenance.insert("artifact".to_string(), artifact.id.clone());
            provenance.insert("source".to_string(), source.clone());

            facts.push(Fact {
                id: fact_id.clone(),
                content,
                source: source.clone(),
                timestamp: Utc::now(),
                confidence: ARTIFACT_FACT_CONFIDENCE,
                provenance,
            });
            by_source.entry(source).or_default().push(fact_id);
        }

        let mut knowledge = Vec::new();
        let mut relationships = Vec::new();
        for (source, fact_ids) in &by_source {
            let knowledge_id = format!("k-{source}");
            knowledge.push(Knowledge {
                id: knowledge_id.clone(),
                content: format!("{} corroborated record(s) from {source}", fact_ids.len()),
                derived_from: fact_ids.clone(),
                confidence: ARTIFACT_FACT_CONFIDENCE,
            });
            for fact_id in fact_ids {
                relationships.push(Relationship {
                    from_id: fact_id.clone(),
                    to_id: knowledge_id.clone(),
                    kind: "supports".into(),
                });
            }
        }

        tracing::debug!(
            facts = facts.len(),
            knowledge = knowledge.len(),
            "enrichment synthesized"
        );
        ctx.enrichment.facts = facts;
        ctx.enrichment.knowledge = knowledge;
        ctx.enrichment.relationships = relationships;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
