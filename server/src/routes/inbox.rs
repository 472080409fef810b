//! Email inbox endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use barista::db::ledger_repo::{self, LedgerQuery, LedgerStatus, ProcessedEmailRow};
use barista::db::module_repo;
use barista::inbox::{PassSummary, SchedulerStatus, UnprocessedMessage, MAX_INTERVAL_MINUTES};
use serde::{Deserialize, Serialize};

use super::{failure, inbox_failure, ok, ApiResult};
use crate::state::AppState;

const DEFAULT_UNPROCESSED_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

/// Run a pass now. Shares the scheduler's single-flight guard.
pub async fn process_now(State(state): State<AppState>) -> ApiResult<PassSummary> {
    match state.scheduler.run_pass_guarded().await {
        Some(Ok(summary)) => ok(summary),
        Some(Err(e)) => Err(inbox_failure(e)),
        None => Err(failure(
            StatusCode::CONFLICT,
            "An email pass is already running",
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnprocessedParams {
    limit: Option<u32>,
}

pub async fn list_unprocessed(
    State(state): State<AppState>,
    Query(params): Query<UnprocessedParams>,
) -> ApiResult<Vec<UnprocessedMessage>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_UNPROCESSED_LIMIT)
        .clamp(1, MAX_LIMIT);
    state
        .engine
        .list_unprocessed(limit)
        .await
        .map_err(inbox_failure)
        .and_then(ok)
}

#[derive(Debug, Deserialize)]
pub struct ProcessedParams {
    status: Option<String>,
    page: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPage {
    pub items: Vec<ProcessedEmailRow>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

pub async fn list_processed(
    State(state): State<AppState>,
    Path(module_id): Path<i64>,
    Query(params): Query<ProcessedParams>,
) -> ApiResult<ProcessedPage> {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<LedgerStatus>()
                .map_err(|e| failure(StatusCode::BAD_REQUEST, e))?,
        ),
        None => None,
    };

    let module = module_repo::find_by_id(&state.db, module_id)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if module.is_none() {
        return Err(failure(
            StatusCode::NOT_FOUND,
            format!("Module {} not found", module_id),
        ));
    }

    let defaults = LedgerQuery::default();
    let query = LedgerQuery {
        status,
        page: params.page.unwrap_or(defaults.page).max(1),
        limit: params
            .limit
            .unwrap_or(defaults.limit)
            .clamp(1, u64::from(MAX_LIMIT)),
    };
    let (items, total) = ledger_repo::list_by_module(&state.db, module_id, &query)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    ok(ProcessedPage {
        items,
        total,
        page: query.page,
        limit: query.limit,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSingleRequest {
    message_id: String,
    #[serde(default)]
    module_name: Option<String>,
}

pub async fn process_single(
    State(state): State<AppState>,
    Json(request): Json<ProcessSingleRequest>,
) -> ApiResult<PassSummary> {
    if request.message_id.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "messageId is required"));
    }
    state
        .engine
        .process_single(request.message_id.trim(), request.module_name.as_deref())
        .await
        .map_err(inbox_failure)
        .and_then(ok)
}

pub async fn scheduler_status(State(state): State<AppState>) -> ApiResult<SchedulerStatus> {
    ok(state.scheduler.status().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchedulerRequest {
    interval_minutes: u64,
}

pub async fn update_scheduler(
    State(state): State<AppState>,
    Json(request): Json<UpdateSchedulerRequest>,
) -> ApiResult<SchedulerStatus> {
    if request.interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("intervalMinutes must be at most {}", MAX_INTERVAL_MINUTES),
        ));
    }
    state
        .scheduler
        .update_interval(request.interval_minutes)
        .await;
    ok(state.scheduler.status().await)
}
