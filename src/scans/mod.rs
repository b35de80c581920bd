use crate::state::AppState;
use axum::Router;

pub mod classifier;
mod dto;
pub mod handlers;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::scan_routes()
}
