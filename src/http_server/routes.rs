//! Verification, health and status routes

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::VerificationState;
use crate::observability::fingerprint;
use crate::verification::{Orchestrator, VerifyError};

use super::pages;

/// Shared state for every route
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub started: Instant,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }
}

/// Member-facing verification routes
pub fn verify_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/verify", get(verify_page_handler))
        .route("/api/verify", post(complete_handler))
        .with_state(state)
}

/// Liveness and status routes
pub fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PlatformStatus {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub restricted: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub platform: PlatformStatus,
    pub database: DatabaseStatus,
    pub timestamp: String,
}

/// Plain-text error response; the web surface reports conflicts as 400
fn error_response(err: &VerifyError) -> Response {
    if err.is_client_error() {
        let status = match err {
            VerifyError::Conflict(_) => StatusCode::BAD_REQUEST,
            other => StatusCode::from_u16(other.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
        };
        (status, err.to_string()).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify user").into_response()
    }
}

// ==================
// Handlers
// ==================

async fn verify_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let code = query.code.unwrap_or_default();
    let orchestrator = &state.orchestrator;

    let record = match orchestrator.web_view(&code) {
        Ok(record) => record,
        Err(e) => {
            orchestrator.logger().debug(
                "WEB_VERIFY_PAGE_REJECTED",
                &[("code_fp", &fingerprint(&code)), ("error", e.code())],
            );
            return error_response(&e);
        }
    };

    let html = match record.state {
        VerificationState::Pending => {
            pages::verification_page(&record, code.trim(), orchestrator.settings())
        }
        VerificationState::Verified => pages::already_verified_page(&record),
        VerificationState::Restricted => pages::restricted_page(),
    };
    Html(html).into_response()
}

async fn complete_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let orchestrator = &state.orchestrator;

    let request: CompleteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            orchestrator
                .logger()
                .debug("WEB_VERIFY_MALFORMED", &[("error", &e.to_string())]);
            return (StatusCode::BAD_REQUEST, "Invalid request").into_response();
        }
    };

    match orchestrator
        .complete_web(&request.code, request.team.as_deref())
        .await
    {
        Ok(outcome) => {
            let message = if outcome.roles_degraded() {
                "Verification recorded, but your roles could not be assigned. \
                 Please contact a moderator."
                    .to_string()
            } else {
                "Verification complete! You can now close this page and return to the server."
                    .to_string()
            };
            (
                StatusCode::OK,
                Json(CompleteResponse {
                    status: "success",
                    message,
                }),
            )
                .into_response()
        }
        Err(e) => {
            if e.is_client_error() {
                orchestrator.logger().debug(
                    "WEB_VERIFY_REJECTED",
                    &[("code_fp", &fingerprint(&request.code)), ("error", e.code())],
                );
            } else {
                orchestrator.logger().error(
                    "WEB_VERIFY_FAILED",
                    &[
                        ("code_fp", &fingerprint(&request.code)),
                        ("error", &e.to_string()),
                    ],
                );
            }
            error_response(&e)
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "OK")
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    let orchestrator = &state.orchestrator;
    let stats = match orchestrator.stats() {
        Ok(stats) => stats,
        Err(e) => {
            orchestrator
                .logger()
                .error("STATUS_STATS_FAILED", &[("error", &e.to_string())]);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve statistics",
            )
                .into_response();
        }
    };

    let response = StatusResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
        platform: PlatformStatus {
            connected: orchestrator.platform_connected(),
        },
        database: DatabaseStatus {
            total: stats.total,
            verified: stats.verified,
            pending: stats.pending,
            restricted: stats.restricted,
        },
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    (StatusCode::OK, Json(response)).into_response()
}
