use chrono::Utc;
use sq_context::{
    AgentContext, Alternative, Conclusion, DiagnosticEntry, InferenceStep, IntentKind, StepOutcome,
};
use sq_domain::error::{Error, Result};
use sq_orchestrator::{LlmOrchestrator, LlmRequest, TaskType};
use sq_pipeline::{Agent, AgentCapabilities};
use sq_context::Namespace;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tuning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thresholds deciding when the inference agent consults the LLM
/// orchestrator instead of relying on its rule-based verification
/// alone.
#[derive(Debug, Clone, Copy)]
pub struct InferenceTuning {
    /// Enough facts to justify a correlation pass.
    pub min_facts: usize,
    /// Enough distinct sources to justify cross-source reasoning.
    pub min_sources: usize,
    /// Below this mean fact confidence, ask for help.
    pub max_mean_confidence: f64,
}

impl Default for InferenceTuning {
    fn default() -> Self {
        Self {
            min_facts: 3,
            min_sources: 2,
            max_mean_confidence: 0.8,
        }
    }
}

const UNDETERMINED_CONFIDENCE: f64 = 0.3;
const WEAK_CONCLUSION: f64 = 0.7;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inference agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verifies hypotheses against enrichment, emitting conclusions with
/// resolvable evidence references and the step-by-step inference
/// chain.
///
/// LLM use is a construction-time toggle: without an orchestrator the
/// agent is purely rule-based; with one, it consults the LLM when the
/// tuning heuristic fires, and silently falls back to the rule-based
/// result on budget exhaustion or the deterministic sentinel.
pub struct InferenceAgent {
    orchestrator: Option<Arc<LlmOrchestrator>>,
    tuning: InferenceTuning,
}

impl InferenceAgent {
    pub fn new() -> Self {
        Self {
            orchestrator: None,
            tuning: InferenceTuning::default(),
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<LlmOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_tuning(mut self, tuning: InferenceTuning) -> Self {
        self.tuning = tuning;
        self
    }

    fn should_use_llm(&self, ctx: &AgentContext) -> bool {
        let facts = &ctx.enrichment.facts;
        if facts.is_empty() {
            return false;
        }
        let sources: BTreeSet<&str> = facts.iter().map(|f| f.source.as_str()).collect();
        let mean_confidence =
            facts.iter().map(|f| f.confidence).sum::<f64>() / facts.len() as f64;
        let reasoning_intent = ctx
            .reasoning
            .intents
            .iter()
            .any(|i| i.is_actionable() && i.kind.is_reasoning_class());

        facts.len() >= self.tuning.min_facts
            || sources.len() >= self.tuning.min_sources
            || mean_confidence < self.tuning.max_mean_confidence
            || reasoning_intent
    }

    fn llm_task(ctx: &AgentContext) -> TaskType {
        if ctx
            .reasoning
            .intents
            .iter()
            .any(|i| i.is_actionable() && i.kind.is_reasoning_class())
        {
            TaskType::DeepReasoning
        } else {
            TaskType::AdvancedInference
        }
    }

    fn build_prompt(ctx: &AgentContext) -> String {
        let mut prompt = String::from("Verify the following hypotheses against the evidence.\n");
        for h in &ctx.reasoning.hypotheses {
            prompt.push_str(&format!("- [{}] {}\n", h.id, h.description));
        }
        prompt.push_str("Evidence:\n");
        for fact in ctx.enrichment.facts.iter().take(20) {
            prompt.push_str(&format!("- ({}) {}\n", fact.source, fact.content));
        }
        prompt
    }
}

impl Default for InferenceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for InferenceAgent {
    fn id(&self) -> &str {
        "inference"
    }

    fn preconditions(&self) -> &[&str] {
        &["reasoning.hypotheses", "enrichment.facts"]
    }

    fn postconditions(&self) -> &[&str] {
        &["reasoning.conclusions", "reasoning.inference_chain"]
    }

    fn write_namespaces(&self) -> Vec<Namespace> {
        vec![Namespace::Reasoning, Namespace::Llm]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            requires_llm: self.orchestrator.is_some(),
            deterministic: self.orchestrator.is_none(),
            estimated_duration_ms: 1_500,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let actionable: Vec<IntentKind> = ctx
            .reasoning
            .intents
            .iter()
            .filter(|i| i.is_actionable())
            .map(|i| i.kind)
            .collect();
        let top_intent = actionable.first().copied().unwrap_or(IntentKind::Unknown);

        let evidence: Vec<String> = ctx
            .enrichment
            .facts
            .iter()
            .map(|f| format!("fact:{}", f.id))
            .chain(
                ctx.enrichment
                    .knowledge
                    .iter()
                    .map(|k| format!("knowledge:{}", k.id)),
            )
            .collect();
        let mean_confidence = if ctx.enrichment.facts.is_empty() {
            0.0
        } else {
            ctx.enrichment.facts.iter().map(|f| f.confidence).sum::<f64>()
                / ctx.enrichment.facts.len() as f64
        };

        let mut chain = Vec::new();
        let mut conclusions = Vec::new();
        let mut alternatives = Vec::new();

        for (idx, hypothesis) in ctx.reasoning.hypotheses.iter().enumerate() {
            if evidence.is_empty() {
                chain.push(InferenceStep {
                    hypothesis_id: hypothesis.id.clone(),
                    outcome: StepOutcome::Undetermined,
                    evidence: Vec::new(),
                    confidence: UNDETERMINED_CONFIDENCE,
                });
                continue;
            }

            let confidence = (0.5 + 0.45 * mean_confidence).min(0.98);
            chain.push(InferenceStep {
                hypothesis_id: hypothesis.id.clone(),
                outcome: StepOutcome::Supported,
                evidence: evidence.clone(),
                confidence,
            });

            let intent = actionable.get(idx).copied().unwrap_or(top_intent);
            let conclusion_id = format!("c{idx}");
            conclusions.push(Conclusion {
                id: conclusion_id.clone(),
                description: format!("supported: {}", hypothesis.description),
                confidence,
                evidence: evidence.clone(),
                intent,
            });
            if confidence < WEAK_CONCLUSION {
                alternatives.push(Alternative {
                    conclusion_id,
                    description: "evidence is thin; the records may not cover the request".into(),
                    confidence: 1.0 - confidence,
                });
            }
        }

        // LLM assist, when configured and warranted.
        if let Some(orchestrator) = &self.orchestrator {
            if self.should_use_llm(&ctx) {
                let prompt = Self::build_prompt(&ctx);
                let request = LlmRequest {
                    context_size: crate::estimate_tokens(&prompt),
                    prompt,
                    task_type: Self::llm_task(&ctx),
                    agent_id: "inference".into(),
                    max_tokens: Some(512),
                    temperature: Some(0.1),
                    use_cache: true,
                };
                let budget = orchestrator.budget_for(&ctx.metadata.session_id);

                match orchestrator.complete(cancel, &budget, &request).await {
                    Ok(outcome) => {
                        crate::apply_outcome(&mut ctx, "inference", &outcome, &budget);
                    }
                    Err(err @ Error::Cancelled(_)) => return Err(err),
                    Err(err @ (Error::BudgetExceeded { .. } | Error::NoProvider { .. })) => {
                        // Rule-based conclusions stand on their own.
                        ctx.llm.decisions = budget.decisions();
                        ctx.diagnostics.warnings.push(DiagnosticEntry {
                            timestamp: Utc::now(),
                            agent_id: "inference".into(),
                            code: "llm-unavailable".into(),
                            message: err.to_string(),
                            details: Vec::new(),
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        ctx.reasoning.inference_chain = chain;
        ctx.reasoning.conclusions = conclusions;
        ctx.reasoning.alternatives = alternatives;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
