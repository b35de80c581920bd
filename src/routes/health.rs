use axum::{extract::State, Json};
use serde::Serialize;
use tracing::instrument;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub auth: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub assistant_loaded: bool,
    pub database: &'static str,
}

pub async fn home() -> Json<HomeResponse> {
    Json(HomeResponse {
        status: "running",
        message: "Brain Tumor Detection API",
        auth: "Email OTP",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.repo.ping().await {
        "connected"
    } else {
        "disconnected"
    };
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.classifier.is_some(),
        assistant_loaded: state.assistant.is_some(),
        database,
    })
}
