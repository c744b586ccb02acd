// SQLGate API server
// Decision: Run state and events are kept in memory; a restart drops suspended runs
// Decision: Thread-scoped routes mirror the approval workflow: start, inspect, resume, stream

mod common;
mod config;
mod threads;

use anyhow::{Context, Result};
use axum::http::{header, Method};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlgate_core::memory::{BroadcastEventEmitter, InMemoryRunStateStore};
use sqlgate_core::{
    ApprovalRequest, Decision, DecisionKind, ExecutionResult, ExecutionStage, MockDataset,
    OperationType, QueryCandidate, RiskLevel, RunMessage, RunOutcome, RunState, SqlAssistant,
    Stage, WorkflowEvent,
};
use sqlgate_openai::OpenAILlmDriver;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    model: String,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.model.clone(),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        threads::create_thread,
        threads::get_thread,
        threads::start_run,
        threads::resume_run,
        threads::stream_sse,
    ),
    components(
        schemas(
            threads::CreateThreadResponse,
            threads::StartRunRequest,
            threads::ResumeRunRequest,
            common::ErrorResponse,
            RunOutcome, RunState, RunMessage, Stage,
            QueryCandidate, OperationType, RiskLevel,
            ApprovalRequest, Decision, DecisionKind,
            ExecutionResult, ExecutionStage,
            WorkflowEvent,
        )
    ),
    tags(
        (name = "threads", description = "Thread endpoints"),
        (name = "runs", description = "Run start and approval resume endpoints"),
        (name = "events", description = "Event streaming endpoints (SSE)")
    ),
    info(
        title = "SQLGate API",
        version = "0.1.0",
        description = "SQL assistant with a human approval step before risky queries run",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Local .env is optional
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sqlgate_api=debug,sqlgate_core=debug,sqlgate_openai=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sqlgate-api starting...");

    let server_config = ServerConfig::from_env();
    let assistant_config = server_config.assistant_config();
    tracing::info!(model = %assistant_config.model, "Assistant configured");

    let driver = OpenAILlmDriver::from_env().context("Failed to create OpenAI driver")?;
    tracing::info!(api_url = %driver.api_url(), "LLM driver configured");

    let dataset = Arc::new(MockDataset::seeded());
    tracing::info!(tables = ?dataset.table_names(), "Mock dataset loaded");

    let events = Arc::new(BroadcastEventEmitter::default());
    let assistant = SqlAssistant::with_arcs(
        assistant_config.clone(),
        Arc::new(driver),
        dataset,
        events.clone(),
        Arc::new(InMemoryRunStateStore::new()),
    );

    let threads_state = threads::AppState::new(Arc::new(assistant), events);
    let health_state = HealthState {
        model: assistant_config.model.clone(),
    };

    // Example: API_PREFIX="/api" results in routes like /api/v1/threads
    if !server_config.api_prefix.is_empty() {
        tracing::info!(prefix = %server_config.api_prefix, "API prefix configured");
    }

    // Only needed when the UI is served from a different origin than the API
    let cors_origins = server_config.cors_origins();
    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    let api_routes = threads::routes(threads_state);

    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .merge(build_router_with_prefix(api_routes, &server_config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ]),
        )
    } else {
        app
    };

    let app = app.layer(TraceLayer::new_for_http());

    let addr = server_config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
