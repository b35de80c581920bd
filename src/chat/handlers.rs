use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    chat::{
        dto::{ChatRequest, ChatResponse, FaqEntryResponse, FaqFilter, FaqListResponse},
        knowledge::KnowledgeEntry,
    },
    errors::AppError,
    extract::{AppJson, AppQuery},
    state::AppState,
};

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

pub fn faq_routes() -> Router<AppState> {
    Router::new()
        .route("/faq", get(list_faq))
        .route("/faq/:id", get(get_faq))
}

#[instrument(skip(state, payload))]
pub async fn chat(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let query = payload.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::validation("Query is required"));
    }
    let assistant = state.assistant.clone().ok_or_else(|| {
        warn!("chat requested but assistant is not loaded");
        AppError::Unavailable("Assistant not loaded".into())
    })?;

    // Embedding is CPU-bound; keep it off the async workers.
    let reply = tokio::task::spawn_blocking(move || assistant.get_response(&query))
        .await
        .map_err(|e| anyhow::anyhow!("embedding task failed: {e}"))?
        .map_err(|e| {
            error!(error = %e, "embedding query failed");
            AppError::ExternalService(e.to_string())
        })?;

    Ok(Json(ChatResponse {
        success: true,
        answer: reply.answer,
        confidence: reply.confidence,
        category: reply.category,
        matched: reply.matched,
    }))
}

#[instrument(skip(state))]
pub async fn list_faq(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<FaqFilter>,
) -> Json<FaqListResponse> {
    let kb = &state.knowledge;
    let keywords = filter.keywords();

    let mut questions: Vec<&KnowledgeEntry> = match filter.category.as_deref().map(str::trim) {
        Some(cat) if !cat.is_empty() => kb.by_category(cat),
        _ => kb.all().iter().collect(),
    };
    if !keywords.is_empty() {
        let hits: Vec<u64> = kb.search_keywords(&keywords).iter().map(|e| e.id).collect();
        questions.retain(|e| hits.contains(&e.id));
    }

    let questions: Vec<KnowledgeEntry> = questions.into_iter().cloned().collect();
    Json(FaqListResponse {
        success: true,
        count: questions.len(),
        categories: kb.categories().into_iter().map(String::from).collect(),
        questions,
    })
}

#[instrument(skip(state))]
pub async fn get_faq(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<FaqEntryResponse>, AppError> {
    let entry = state
        .knowledge
        .get(id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Question not found".into()))?;
    Ok(Json(FaqEntryResponse {
        success: true,
        question: entry,
    }))
}
