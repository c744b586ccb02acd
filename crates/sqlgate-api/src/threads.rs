// Thread and run HTTP routes
//
// A thread holds at most one run. Starting a run replaces the previous one;
// a run suspended at the approval gate is continued with /resume. Workflow
// events are pushed to /sse subscribers as notifications only; the run state
// endpoint is the source of truth.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlgate_core::memory::{BroadcastEventEmitter, InMemoryRunStateStore};
use sqlgate_core::{Decision, RunOutcome, RunState, SqlAssistant, WorkflowEvent};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{ApiError, ErrorResponse};

/// Assistant as wired by the server
pub type ApiAssistant = SqlAssistant<BroadcastEventEmitter, InMemoryRunStateStore>;

// ============================================
// App State and Routes
// ============================================

/// App state
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<ApiAssistant>,
    pub events: Arc<BroadcastEventEmitter>,
}

impl AppState {
    pub fn new(assistant: Arc<ApiAssistant>, events: Arc<BroadcastEventEmitter>) -> Self {
        Self { assistant, events }
    }
}

/// Create thread routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/threads", post(create_thread))
        .route("/v1/threads/:thread_id", get(get_thread))
        .route("/v1/threads/:thread_id/runs", post(start_run))
        .route("/v1/threads/:thread_id/resume", post(resume_run))
        .route("/v1/threads/:thread_id/sse", get(stream_sse))
        .with_state(state)
}

// ============================================
// Request / Response DTOs
// ============================================

/// Response to thread creation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateThreadResponse {
    /// Identifier of the new thread.
    pub thread_id: Uuid,
}

/// Request to start a run on a thread
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRunRequest {
    /// Natural-language description of the data operation.
    #[schema(example = "Show me all users")]
    pub input: String,
}

/// Request to resume a suspended run
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResumeRunRequest {
    /// The reviewer's decision.
    pub decision: Decision,
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/threads - Create a new thread
#[utoipa::path(
    post,
    path = "/v1/threads",
    responses(
        (status = 201, description = "Thread created successfully", body = CreateThreadResponse)
    ),
    tag = "threads"
)]
pub async fn create_thread(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateThreadResponse>) {
    let thread_id = state.assistant.create_thread();
    (StatusCode::CREATED, Json(CreateThreadResponse { thread_id }))
}

/// GET /v1/threads/{thread_id} - Current run state of a thread
#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}",
    params(
        ("thread_id" = Uuid, Path, description = "Thread ID")
    ),
    responses(
        (status = 200, description = "Run state", body = RunState),
        (status = 404, description = "No run on this thread", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "threads"
)]
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<RunState>, ApiError> {
    let run_state = state
        .assistant
        .get_state(thread_id)
        .await?
        .ok_or(sqlgate_core::SqlGateError::ThreadNotFound(thread_id))?;

    Ok(Json(run_state))
}

/// POST /v1/threads/{thread_id}/runs - Start a run
///
/// Returns `completed` when the query was auto-approved (or generation
/// failed), `interrupted` with the approval request otherwise.
#[utoipa::path(
    post,
    path = "/v1/threads/{thread_id}/runs",
    params(
        ("thread_id" = Uuid, Path, description = "Thread ID")
    ),
    request_body = StartRunRequest,
    responses(
        (status = 200, description = "Run completed or suspended for approval", body = RunOutcome),
        (status = 400, description = "Empty input", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "runs"
)]
pub async fn start_run(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<StartRunRequest>,
) -> Result<Json<RunOutcome>, ApiError> {
    let input = req.input.trim();
    if input.is_empty() {
        return Err(ApiError::bad_request("input must not be empty"));
    }

    let outcome = state.assistant.start(thread_id, input).await?;
    Ok(Json(outcome))
}

/// POST /v1/threads/{thread_id}/resume - Resume a suspended run
#[utoipa::path(
    post,
    path = "/v1/threads/{thread_id}/resume",
    params(
        ("thread_id" = Uuid, Path, description = "Thread ID")
    ),
    request_body = ResumeRunRequest,
    responses(
        (status = 200, description = "Run completed", body = RunOutcome),
        (status = 404, description = "No run on this thread", body = ErrorResponse),
        (status = 409, description = "Run is not awaiting approval", body = ErrorResponse),
        (status = 422, description = "Decision not allowed for this request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "runs"
)]
pub async fn resume_run(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<ResumeRunRequest>,
) -> Result<Json<RunOutcome>, ApiError> {
    let outcome = state.assistant.resume(thread_id, req.decision).await?;
    Ok(Json(outcome))
}

/// GET /v1/threads/{thread_id}/sse - Stream workflow events (SSE notifications)
///
/// Only events emitted after the connection is opened are delivered.
#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}/sse",
    params(
        ("thread_id" = Uuid, Path, description = "Thread ID")
    ),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream")
    ),
    tag = "events"
)]
pub async fn stream_sse(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    tracing::info!(thread_id = %thread_id, "Starting event stream");

    let stream = thread_events(&state.events, thread_id).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(event.event_type()).data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Live events of one thread
pub fn thread_events(
    emitter: &BroadcastEventEmitter,
    thread_id: Uuid,
) -> impl Stream<Item = WorkflowEvent> {
    BroadcastStream::new(emitter.subscribe()).filter_map(move |item| {
        let event = match item {
            Ok(event) if event.thread_id() == thread_id => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(thread_id = %thread_id, skipped, "SSE subscriber lagged");
                None
            }
        };
        futures::future::ready(event)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use std::time::Duration;
    use sqlgate_core::memory::MockLlmDriver;
    use sqlgate_core::{AssistantConfig, EventEmitter, MockDataset};
    use tower::ServiceExt;

    async fn test_state(sql: &str) -> AppState {
        let driver = MockLlmDriver::with_sql(sql, "test query").await;
        let events = Arc::new(BroadcastEventEmitter::default());
        let assistant = SqlAssistant::with_arcs(
            AssistantConfig::default(),
            Arc::new(driver),
            Arc::new(MockDataset::seeded()),
            events.clone(),
            Arc::new(InMemoryRunStateStore::new()),
        );
        AppState::new(Arc::new(assistant), events)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(json) => request.body(Body::from(json.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn new_thread(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/v1/threads", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["thread_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_reject_flow() {
        let app = routes(test_state("DELETE FROM orders").await);
        let thread_id = new_thread(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/runs", thread_id),
            Some(serde_json::json!({"input": "delete all orders"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "interrupted");
        assert_eq!(
            body["approval_request"]["allowed_decisions"],
            serde_json::json!(["approve", "reject"])
        );
        assert_eq!(body["approval_request"]["candidate"]["risk_level"], "critical");

        // Edit is not offered for critical queries
        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/resume", thread_id),
            Some(serde_json::json!({
                "decision": {"type": "edit", "edited_sql": "DELETE FROM orders WHERE id = 1"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("edit"));

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/resume", thread_id),
            Some(serde_json::json!({"decision": {"type": "reject", "reason": "too risky"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["result"]["stage"], "rejected");
        assert!(body["result"]["summary"]
            .as_str()
            .unwrap()
            .contains("too risky"));

        let (status, body) = send(&app, "GET", &format!("/v1/threads/{}", thread_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "rejected");
        assert_eq!(body["is_complete"], true);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/resume", thread_id),
            Some(serde_json::json!({"decision": {"type": "approve"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_auto_approved_select() {
        let app = routes(test_state("SELECT * FROM users").await);
        let thread_id = new_thread(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/runs", thread_id),
            Some(serde_json::json!({"input": "show users"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["result"]["stage"], "executed");
        assert_eq!(body["result"]["rows"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let app = routes(test_state("SELECT 1").await);
        let thread_id = Uuid::now_v7();

        let (status, _) = send(&app, "GET", &format!("/v1/threads/{}", thread_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/resume", thread_id),
            Some(serde_json::json!({"decision": {"type": "approve"}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_empty_input_is_bad_request() {
        let app = routes(test_state("SELECT 1").await);
        let thread_id = new_thread(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/runs", thread_id),
            Some(serde_json::json!({"input": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_streams_thread_events() {
        let app = routes(test_state("SELECT * FROM users").await);
        let thread_id = new_thread(&app).await;
        let other_thread = new_thread(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/threads/{}/sse", thread_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        for id in [&other_thread, &thread_id] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/v1/threads/{}/runs", id),
                Some(serde_json::json!({"input": "show users"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let mut body = response.into_body();
        let mut text = String::new();
        while !text.contains("event: execution_completed") {
            let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
                .await
                .expect("SSE frame within timeout")
                .expect("SSE stream still open")
                .unwrap();
            if let Ok(data) = frame.into_data() {
                text.push_str(&String::from_utf8_lossy(&data));
            }
        }

        assert!(text.contains("event: run_started"));
        assert!(text.contains("event: sql_generated"));
        assert!(text.contains("event: auto_approved"));
        assert!(text.contains(&thread_id));
        assert!(!text.contains(&other_thread));
    }

    #[tokio::test]
    async fn test_blank_edit_is_unprocessable() {
        let app = routes(test_state("UPDATE users SET name = 'x' WHERE id = 1").await);
        let thread_id = new_thread(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/runs", thread_id),
            Some(serde_json::json!({"input": "rename user"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "interrupted");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/threads/{}/resume", thread_id),
            Some(serde_json::json!({"decision": {"type": "edit", "edited_sql": "  "}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("edited_sql"));

        let (_, body) = send(&app, "GET", &format!("/v1/threads/{}", thread_id), None).await;
        assert_eq!(body["stage"], "waiting_approval");
    }

    #[tokio::test]
    async fn test_thread_events_filters_by_thread() {
        let emitter = BroadcastEventEmitter::default();
        let mine = Uuid::now_v7();
        let other = Uuid::now_v7();

        let stream = thread_events(&emitter, mine);
        emitter
            .emit(WorkflowEvent::run_started(other, "not mine"))
            .await
            .unwrap();
        emitter
            .emit(WorkflowEvent::run_started(mine, "mine"))
            .await
            .unwrap();

        let events: Vec<WorkflowEvent> = stream.take(1).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].thread_id(), mine);
    }
}
