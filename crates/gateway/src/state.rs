use sq_context::MemoryArtifactStore;
use sq_domain::config::Config;
use sq_orchestrator::LlmOrchestrator;
use sq_pipeline::PipelineManager;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<LlmOrchestrator>,
    pub manager: Arc<PipelineManager>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub started_at: Instant,
}
