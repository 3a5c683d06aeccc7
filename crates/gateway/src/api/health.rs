use crate::state::AppState;
use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    uptime_secs: u64,
    sessions: u64,
    requests: u64,
    total_cost_usd: f64,
    cache_entries: usize,
    externalized_artifacts: usize,
}

pub async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let totals = state.orchestrator.usage_totals();
    Json(Health {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: totals.sessions,
        requests: totals.requests,
        total_cost_usd: totals.cost_usd,
        cache_entries: state.orchestrator.cache().len(),
        externalized_artifacts: state.artifacts.len(),
    })
}
