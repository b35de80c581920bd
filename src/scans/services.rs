use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    db::Repository,
    scans::repo_types::{NewScan, PatientMeta, ScanRecord},
};

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 100;

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// Append-only record of classifier runs per user.
pub struct ScanHistory {
    repo: Arc<dyn Repository>,
}

impl ScanHistory {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn save(
        &self,
        user_id: Uuid,
        prediction: &str,
        confidence: f64,
        patient: PatientMeta,
    ) -> anyhow::Result<ScanRecord> {
        let record = self
            .repo
            .insert_scan(NewScan {
                user_id,
                prediction: prediction.to_string(),
                confidence,
                patient,
            })
            .await?;
        info!(user_id = %user_id, scan_id = %record.id, prediction, "scan saved");
        Ok(record)
    }

    /// Most recent first.
    pub async fn list(&self, user_id: Uuid, limit: Option<i64>) -> anyhow::Result<Vec<ScanRecord>> {
        self.repo.list_scans(user_id, clamp_limit(limit)).await
    }
}
