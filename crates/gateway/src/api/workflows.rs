use crate::state::AppState;
use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct WorkflowList {
    default: String,
    workflows: Vec<WorkflowInfo>,
}

#[derive(Serialize)]
pub struct WorkflowInfo {
    name: String,
    mode: String,
    agents: Vec<String>,
}

pub async fn list_workflows(State(state): State<AppState>) -> Json<WorkflowList> {
    let mut workflows = Vec::new();
    for name in &state.config.workflows.enabled {
        let Some(pipeline) = state.config.workflow_pipeline(name) else {
            continue;
        };
        workflows.push(WorkflowInfo {
            name: name.clone(),
            mode: format!("{:?}", pipeline.mode).to_lowercase(),
            agents: pipeline.agents.iter().map(|a| a.id.clone()).collect(),
        });
    }
    Json(WorkflowList {
        default: state.config.workflows.default.clone(),
        workflows,
    })
}
