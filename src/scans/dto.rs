use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scans::repo_types::ScanRecord;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: String,
    pub confidence: f64,
    pub all_predictions: BTreeMap<String, f64>,
}

/// `limit` is kept raw; anything that is not an integer falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

impl HistoryQuery {
    pub fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub history: Vec<ScanRecord>,
}
