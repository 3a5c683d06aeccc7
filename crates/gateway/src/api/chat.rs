//! OpenAI-compatible `/v1/chat/completions` endpoint.
//!
//! Accepts the standard chat-completions request shape, runs the
//! selected workflow's pipeline over a fresh session context, and
//! returns an OpenAI-shaped response (JSON or SSE streaming) carrying
//! the serialized reasoning context as an extension field.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use sq_context::AgentContext;
use crate::state::AppState;

const WORKFLOW_HEADER: &str = "x-sequent-workflow";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct ChatResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
    /// The full reasoning artifact for this session.
    context: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct Chunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
struct ChunkChoice {
    index: u32,
    delta: ChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize, Default)]
struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Stable error shape for every non-2xx response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn error_response(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                message: message.into(),
                kind,
            },
        }),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(prompt) = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "no user message in request",
        );
    };

    // Workflow selection: header, falling back to the configured
    // default.
    let workflow = headers
        .get(WORKFLOW_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&state.config.workflows.default)
        .to_string();
    let Some(pipeline) = state.config.workflow_pipeline(&workflow) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            format!("unknown workflow '{workflow}'"),
        );
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let trace_id = uuid::Uuid::new_v4().to_string();
    let mut ctx = AgentContext::new(session_id.clone(), trace_id);
    ctx.metadata.query = Some(prompt);

    let budget = state.orchestrator.budget_for(&session_id);
    let cancel = CancellationToken::new();

    let outcome = state.manager.run(&cancel, &workflow, pipeline, ctx).await;
    let mut context = outcome.context;
    // Mirror the authoritative decision log before the tracker drops.
    context.llm.decisions = budget.decisions();
    state.orchestrator.drop_session(&session_id);

    if let Some(err) = outcome.error {
        tracing::error!(session_id = %session_id, error = %err, "pipeline failed");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "server_error", err.to_string());
    }

    let content = context
        .reasoning
        .summary
        .clone()
        .unwrap_or_else(|| "no summary produced".into());
    let model = request.model.unwrap_or_else(|| "sequent".into());
    let response_id = format!("chatcmpl-{session_id}");
    let created = Utc::now().timestamp();

    if request.stream {
        return stream_response(response_id, model, created, content);
    }

    let usage = Usage {
        prompt_tokens: context.llm.usage.prompt_tokens,
        completion_tokens: context.llm.usage.completion_tokens,
        total_tokens: context.llm.usage.prompt_tokens + context.llm.usage.completion_tokens,
    };
    let context_json = match serde_json::to_value(&context) {
        Ok(value) => value,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                err.to_string(),
            )
        }
    };

    Json(ChatResponse {
        id: response_id,
        object: "chat.completion",
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content,
            },
            finish_reason: "stop",
        }],
        usage,
        context: context_json,
    })
    .into_response()
}

/// One content stream per session: a role chunk, the content, a finish
/// chunk, then `[DONE]`.
fn stream_response(id: String, model: String, created: i64, content: String) -> Response {
    let chunk = |delta: ChunkDelta, finish: Option<&'static str>| Chunk {
        id: id.clone(),
        object: "chat.completion.chunk",
        created,
        model: model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: finish,
        }],
    };

    let events = vec![
        chunk(
            ChunkDelta {
                role: Some("assistant"),
                content: None,
            },
            None,
        ),
        chunk(
            ChunkDelta {
                role: None,
                content: Some(content),
            },
            None,
        ),
        chunk(ChunkDelta::default(), Some("stop")),
    ];

    let stream = stream::iter(
        events
            .into_iter()
            .map(|c| Event::default().json_data(c))
            .chain(std::iter::once(Ok(Event::default().data("[DONE]"))))
            .collect::<Vec<_>>(),
    );

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
