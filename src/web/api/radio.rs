use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::web::server::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RadioStatusResponse {
    pub device: String,
    pub connected: bool,
    pub error: Option<String>,
    /// Sessions currently holding the radio.
    pub sessions: usize,
}

#[utoipa::path(
    get,
    path = "/api/radio/status",
    responses(
        (status = 200, description = "Radio link status", body = RadioStatusResponse)
    ),
    tag = "radio"
)]
pub async fn status(State(state): State<AppState>) -> Json<RadioStatusResponse> {
    let status = state.radio.status();
    Json(RadioStatusResponse {
        device: state.config.radio.port.clone(),
        connected: status.connected,
        error: status.error,
        sessions: state.radio.holders(),
    })
}
