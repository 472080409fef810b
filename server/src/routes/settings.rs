//! Settings writes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use barista::inbox::MAX_INTERVAL_MINUTES;
use barista::settings::EMAIL_CHECK_INTERVAL;
use log::info;
use serde::{Deserialize, Serialize};

use super::{failure, ok, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WriteSettingRequest {
    value: String,
    #[serde(default)]
    encrypted: bool,
}

#[derive(Debug, Serialize)]
pub struct WrittenSetting {
    key: String,
    encrypted: bool,
}

/// Writes a setting and drops its cached value. A new
/// `email_check_interval` also reschedules polling.
pub async fn write_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<WriteSettingRequest>,
) -> ApiResult<WrittenSetting> {
    let interval = if key == EMAIL_CHECK_INTERVAL {
        let minutes = request
            .value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|m| *m <= MAX_INTERVAL_MINUTES)
            .ok_or_else(|| {
                failure(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "{} must be a whole number of minutes up to {}",
                        EMAIL_CHECK_INTERVAL, MAX_INTERVAL_MINUTES
                    ),
                )
            })?;
        Some(minutes)
    } else {
        None
    };

    state
        .settings
        .set(&key, &request.value, request.encrypted)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if let Some(minutes) = interval {
        info!("Email check interval changed to {} minute(s)", minutes);
        state.scheduler.update_interval(minutes).await;
    }

    ok(WrittenSetting {
        key,
        encrypted: request.encrypted,
    })
}
