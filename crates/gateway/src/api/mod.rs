mod chat;
mod health;
mod workflows;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/workflows", get(workflows::list_workflows))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from config: `"*"` is fully permissive; otherwise origins match
/// exactly, with a trailing `:*` accepting any port.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let patterns = origins.to_vec();
    CorsLayer::new().allow_origin(AllowOrigin::predicate(move |origin, _| {
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        patterns.iter().any(|p| match p.strip_suffix(":*") {
            Some(prefix) => {
                origin == prefix
                    || origin
                        .strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix(':'))
                        .is_some_and(|port| port.chars().all(|c| c.is_ascii_digit()))
            }
            None => origin == p,
        })
    }))
}
