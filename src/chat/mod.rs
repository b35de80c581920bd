use crate::state::AppState;
use axum::Router;

mod dto;
pub mod embedder;
pub mod handlers;
pub mod knowledge;
pub mod matcher;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::chat_routes())
        .merge(handlers::faq_routes())
}
