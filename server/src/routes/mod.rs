//! HTTP routes for the operator surface.
//!
//! Routes are organized by domain:
//! - `inbox`: passes, unprocessed mail, ledger pages and the scheduler
//! - `settings`: runtime settings writes

pub mod inbox;
pub mod settings;

use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use barista::InboxError;
use serde::Serialize;

use crate::state::AppState;

/// Response wrapper for API calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// A failed request: status code plus the error envelope.
pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::err(message)))
}

/// Maps engine errors onto HTTP statuses.
pub fn inbox_failure(err: InboxError) -> ApiError {
    let status = match &err {
        InboxError::AlreadyProcessed(_) => StatusCode::CONFLICT,
        InboxError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        InboxError::ModuleRequired(_) => StatusCode::BAD_REQUEST,
        InboxError::Transport(_)
        | InboxError::Api { .. }
        | InboxError::Auth(_)
        | InboxError::Decode(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, err.to_string())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<ApiResponse<Health>> {
    Json(ApiResponse::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/email-inbox/process", post(inbox::process_now))
        .route("/api/email-inbox/unprocessed", get(inbox::list_unprocessed))
        .route(
            "/api/email-inbox/modules/:id/processed",
            get(inbox::list_processed),
        )
        .route("/api/email-inbox/process-single", post(inbox::process_single))
        .route(
            "/api/email-inbox/scheduler",
            get(inbox::scheduler_status).put(inbox::update_scheduler),
        )
        .route("/api/settings/:key", put(settings::write_setting))
        .with_state(state)
}
