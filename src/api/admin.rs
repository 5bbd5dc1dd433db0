use std::collections::BTreeMap;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use log::{error, info, warn};

use crate::api::AppState;
use crate::data::{ControlError, ServiceInfo};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub status: AdminStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    #[serde(skip)]
    code: StatusCode,
}

impl AdminResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: AdminStatus::Success,
            message: message.into(),
            current_step: None,
            code: StatusCode::OK,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!("Admin warning: {}", message);
        Self {
            status: AdminStatus::Warning,
            message,
            current_step: None,
            code: StatusCode::OK,
        }
    }

    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Admin error: {}", message);
        Self {
            status: AdminStatus::Error,
            message,
            current_step: None,
            code,
        }
    }

    fn with_step(mut self, step: usize) -> Self {
        self.current_step = Some(step);
        self
    }
}

impl From<ControlError> for AdminResponse {
    fn from(err: ControlError) -> Self {
        let code = match err {
            ControlError::Load(_) | ControlError::LockPoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::error(code, err.to_string())
    }
}

impl IntoResponse for AdminResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RoundUpdate {
    pub round_number: i64,
    pub chart_data: Option<BTreeMap<String, i64>>,
    pub news: Option<Vec<String>>,
}

// GET /service_info - Current and upcoming round data
pub async fn service_info(State(state): State<AppState>) -> Result<Json<ServiceInfo>, AdminResponse> {
    Ok(Json(state.controller.service_info()?))
}

// POST /next_round - Start next round and publish its chart data
pub async fn next_round(State(state): State<AppState>) -> AdminResponse {
    match state.controller.next_round().await {
        Ok(true) => AdminResponse::success("Advanced to next round"),
        Ok(false) => AdminResponse::warning("Already at last round"),
        Err(e) => e.into(),
    }
}

// POST /publish_news - Reveal news for the next round
pub async fn publish_news(State(state): State<AppState>) -> AdminResponse {
    match state.controller.publish_news().await {
        Ok(true) => AdminResponse::success("News published successfully"),
        Ok(false) => AdminResponse::warning(
            "Cannot publish news: constraint violation or already at last news step",
        ),
        Err(e) => e.into(),
    }
}

// POST /edit_round - Replace a round's chart data and/or news
pub async fn edit_round(
    State(state): State<AppState>,
    payload: Result<Json<RoundUpdate>, JsonRejection>,
) -> AdminResponse {
    let Json(update) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return AdminResponse::error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.controller.edit_round(update.round_number, update.chart_data, update.news).await {
        Ok(round) => {
            info!("Admin edited round {}", round);
            AdminResponse::success(format!("Round {} updated successfully", round))
        }
        Err(e) => e.into(),
    }
}

// POST /go_to_step/:step - Jump to an arbitrary round
pub async fn go_to_step(
    State(state): State<AppState>,
    step: Result<Path<i64>, PathRejection>,
) -> AdminResponse {
    let Path(step) = match step {
        Ok(step) => step,
        Err(rejection) => {
            return AdminResponse::error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.controller.go_to_step(step).await {
        Ok(step) => AdminResponse::success(format!("Jumped to step {}", step)).with_step(step),
        Err(e) => e.into(),
    }
}

// POST /finish_game - Stop every viewer stream
pub async fn finish_game(State(state): State<AppState>) -> AdminResponse {
    let notified = state.controller.finish_game().await;
    info!("Game finished, stop sent to {} subscribers", notified);
    AdminResponse::success("Game finished successfully")
}

// POST /reset - Reload round data and rewind
pub async fn reset(State(state): State<AppState>) -> AdminResponse {
    match state.controller.reset().await {
        Ok(()) => AdminResponse::success("Game reset successfully"),
        Err(e) => e.into(),
    }
}
