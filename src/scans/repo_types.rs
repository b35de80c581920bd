use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One classifier run, as stored in `scan_history`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prediction: String,
    pub confidence: f64,            // percent, unrounded
    pub patient_name: String,
    pub patient_age: String,
    pub patient_gender: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scanned_at: OffsetDateTime,
}

/// Free-form patient details submitted alongside an MRI image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientMeta {
    pub name: String,
    pub age: String,
    pub gender: String,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub user_id: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub patient: PatientMeta,
}
