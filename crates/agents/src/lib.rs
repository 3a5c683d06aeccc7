//! Built-in reasoning agents.
//!
//! Every agent has a complete rule-based path, so a pipeline still
//! produces a full reasoning artifact when the orchestrator lands on
//! the deterministic sentinel or the budget runs out. The inference
//! agent optionally consults the LLM orchestrator when its heuristic
//! fires.

mod executor;
mod inference;
mod intent;
mod llm;
mod planner;
mod structure;
mod summarizer;
mod synthesizer;
mod validator;

pub use executor::*;
pub use inference::*;
pub use intent::*;
pub use llm::*;
pub use planner::*;
pub use structure::*;
pub use summarizer::*;
pub use synthesizer::*;
pub use validator::*;

use sq_orchestrator::LlmOrchestrator;
use sq_pipeline::AgentRegistry;
use sq_providers::DatasourceClient;
use std::sync::Arc;

/// Register the full built-in agent set. The inference agent is wired
/// to the orchestrator; everything else is rule-based.
pub fn default_registry(
    orchestrator: Arc<LlmOrchestrator>,
    datasource: Arc<dyn DatasourceClient>,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(IntentAgent::new()));
    registry.register(Arc::new(StructureAgent::new()));
    registry.register(Arc::new(PlannerAgent::new()));
    registry.register(Arc::new(ExecutorAgent::new(datasource)));
    registry.register(Arc::new(SynthesizerAgent::new()));
    registry.register(Arc::new(
        InferenceAgent::new().with_orchestrator(orchestrator),
    ));
    registry.register(Arc::new(ValidatorAgent::new()));
    registry.register(Arc::new(SummarizerAgent::new()));
    registry
}
