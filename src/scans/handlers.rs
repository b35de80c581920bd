use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    errors::AppError,
    extract::AppQuery,
    scans::{
        classifier::Prediction,
        dto::{HistoryQuery, HistoryResponse, PredictResponse},
        repo_types::PatientMeta,
    },
    state::AppState,
};

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
        .route("/scan-history", get(scan_history))
}

struct Upload {
    body: Bytes,
    content_type: String,
}

/// POST /predict (multipart): `file` plus optional patient_name / patient_age / patient_gender.
#[instrument(skip(state, claims, mp))]
pub async fn predict(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mut mp: Multipart,
) -> Result<Json<PredictResponse>, AppError> {
    let classifier = state
        .classifier
        .clone()
        .ok_or_else(|| AppError::Unavailable("Model not loaded".into()))?;

    let mut upload: Option<Upload> = None;
    let mut patient = PatientMeta::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if field.file_name().map_or(true, str::is_empty) {
                    return Err(AppError::validation("No file selected"));
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Malformed upload: {e}")))?;
                upload = Some(Upload { body, content_type });
            }
            "patient_name" | "patient_age" | "patient_gender" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Malformed upload: {e}")))?;
                match name.as_str() {
                    "patient_name" => patient.name = value,
                    "patient_age" => patient.age = value,
                    _ => patient.gender = value,
                }
            }
            _ => {}
        }
    }
    let upload = upload.ok_or_else(|| AppError::validation("No file provided"))?;

    let probs = classifier
        .classify(upload.body, &upload.content_type)
        .await
        .map_err(|e| {
            error!(error = %e, "classifier call failed");
            AppError::ExternalService(e.to_string())
        })?;
    let prediction = Prediction::from_probabilities(&probs).map_err(|e| {
        warn!(error = %e, "classifier output rejected");
        AppError::ExternalService(e.to_string())
    })?;

    state
        .scans
        .save(claims.sub, prediction.label, prediction.raw_confidence, patient)
        .await?;

    Ok(Json(PredictResponse {
        success: true,
        prediction: prediction.label.to_string(),
        confidence: prediction.confidence,
        all_predictions: prediction
            .all_predictions
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }))
}

#[instrument(skip(state, claims))]
pub async fn scan_history(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppQuery(q): AppQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state.scans.list(claims.sub, q.limit()).await?;
    Ok(Json(HistoryResponse {
        success: true,
        count: history.len(),
        history,
    }))
}
