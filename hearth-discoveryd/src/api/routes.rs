use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use shared::protocol;
use shared::types::{DiscoverResponse, ErrorResponse};

use crate::mdns::scanner::Scanner;

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(protocol::DISCOVER_PATH, get(discover_devices))
        .route(protocol::STATUS_PATH, get(get_status))
        .with_state(state)
}

/// Run one full scan window and return everything it found. The panel UI
/// only ever sees the opaque failure message; details go to the log.
async fn discover_devices(
    State(state): State<AppState>,
) -> Result<Json<DiscoverResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.scanner.run_once().await {
        Ok(devices) => {
            tracing::info!("Discovery scan returned {} devices", devices.len());
            Ok(Json(DiscoverResponse {
                success: true,
                devices,
            }))
        }
        Err(e) => {
            tracing::error!("Device discovery failed: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    success: false,
                    error: protocol::DISCOVERY_FAILED.to_string(),
                }),
            ))
        }
    }
}

async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
