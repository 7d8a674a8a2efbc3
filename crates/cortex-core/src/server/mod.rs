//! HTTP surface for the escalation router.
//!
//! - `GET /health`
//! - `GET /experts`
//! - `GET /stats`
//! - `POST /chat`

pub mod api;
pub mod logging;

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::{CortexError, Result};
use crate::performance::Statistics;
use crate::router::EscalationRouter;
use api::{ChatRequest, ChatResponse, ErrorBody, ErrorDetail, ExpertsResponse, HealthResponse};
use logging::RequestLoggerLayer;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    router: Arc<EscalationRouter>,
}

/// Builds the application with logging and CORS layers.
pub fn app(router: Arc<EscalationRouter>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/experts", get(experts))
        .route("/stats", get(stats))
        .route("/chat", post(chat))
        .layer(ServiceBuilder::new().layer(RequestLoggerLayer).layer(CorsLayer::permissive()))
        .with_state(AppState { router })
}

/// Serves the application on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run<F>(router: Arc<EscalationRouter>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Cortex server listening");
    axum::serve(listener, app(router)).with_graceful_shutdown(shutdown).await?;
    info!("Cortex server stopped");
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", cortex: "ready" })
}

async fn experts(State(state): State<AppState>) -> Json<ExpertsResponse> {
    Json(ExpertsResponse {
        experts: state.router.experts(),
        enabled: state.router.config().enabled,
    })
}

async fn stats(State(state): State<AppState>) -> std::result::Result<Json<Statistics>, ApiError> {
    Ok(Json(state.router.statistics()?))
}

/// Runs the request in its own task. Dropping this handler (client gone)
/// drops the guard, which cancels the task.
async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    let request = payload.into_model_request();
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("request has no message content".to_string()));
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let router = Arc::clone(&state.router);

    let task = tokio::spawn(async move { router.process_request_with_cancel(&request, &cancel).await });
    let routed = task.await.map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(routed.into()))
}

/// Handler error, mapped to a status code.
#[derive(Debug)]
pub enum ApiError {
    /// Routing, configuration or execution failure.
    Cortex(CortexError),
    /// Request unusable after normalization.
    BadRequest(String),
    /// The request task failed.
    Internal(String),
}

impl From<CortexError> for ApiError {
    fn from(e: CortexError) -> Self {
        Self::Cortex(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Self::Cortex(e) => match e {
                CortexError::Execution { .. } => (StatusCode::BAD_GATEWAY, "execution_error"),
                CortexError::ExpertNotFound(_) => (StatusCode::INTERNAL_SERVER_ERROR, "expert_not_found"),
                CortexError::EscalationLoopDetected { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "escalation_loop")
                }
                CortexError::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "cancelled"),
                CortexError::Configuration(_) | CortexError::Model(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "routing_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        let mut detail = ErrorDetail { kind, message: String::new(), details: BTreeMap::new() };

        match self {
            Self::BadRequest(message) | Self::Internal(message) => detail.message = message,
            Self::Cortex(e) => {
                match &e {
                    CortexError::EscalationLoopDetected { path } => {
                        detail.details.insert("escalation_path", serde_json::json!(path));
                    }
                    CortexError::Execution { expert, .. } => {
                        detail.details.insert("expert", serde_json::json!(expert));
                    }
                    _ => {}
                }
                detail.message = e.to_string();
            }
        }

        if status.is_server_error() {
            error!(status = status.as_u16(), kind, message = %detail.message, "Request failed");
        } else {
            warn!(status = status.as_u16(), kind, message = %detail.message, "Request rejected");
        }
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}
