use axum::{routing::get, Router};

use crate::state::AppState;

mod health;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::home))
        .route("/health", get(health::health))
}
