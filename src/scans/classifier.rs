use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

/// Output order of the classifier's probability vector.
pub const CLASSES: [&str; 4] = [
    "glioma_tumor",
    "meningioma_tumor",
    "no_tumor",
    "pituitary_tumor",
];

const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Prediction timed out")]
    Timeout,
    #[error("Prediction error: {0}")]
    Upstream(String),
    #[error("Prediction error: expected {expected} probabilities, got {got}")]
    BadOutput { expected: usize, got: usize },
}

/// Image in, per-class probabilities (in `CLASSES` order) out.
#[async_trait]
pub trait ScanClassifier: Send + Sync {
    async fn classify(&self, image: Bytes, content_type: &str) -> Result<Vec<f32>, ClassifierError>;
}

/// Inference service reached over HTTP; the image goes up as multipart `file`.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct InferenceResponse {
    probabilities: Vec<f32>,
}

impl HttpClassifier {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLASSIFY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> ClassifierError {
    if e.is_timeout() {
        ClassifierError::Timeout
    } else {
        ClassifierError::Upstream(e.to_string())
    }
}

#[async_trait]
impl ScanClassifier for HttpClassifier {
    async fn classify(&self, image: Bytes, content_type: &str) -> Result<Vec<f32>, ClassifierError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("scan")
            .mime_str(content_type)
            .map_err(|e| ClassifierError::Upstream(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        if !res.status().is_success() {
            return Err(ClassifierError::Upstream(format!(
                "classifier answered {}",
                res.status()
            )));
        }
        let body: InferenceResponse = res.json().await.map_err(transport_error)?;
        debug!(n = body.probabilities.len(), "classifier responded");
        Ok(body.probabilities)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: &'static str,
    /// Percentage, unrounded; this is what gets stored.
    pub raw_confidence: f64,
    /// Percentage rounded to two decimals.
    pub confidence: f64,
    pub all_predictions: BTreeMap<&'static str, f64>,
}

impl Prediction {
    /// Argmax over `probs`; on equal probabilities the earlier class wins.
    pub fn from_probabilities(probs: &[f32]) -> Result<Self, ClassifierError> {
        if probs.len() != CLASSES.len() {
            return Err(ClassifierError::BadOutput {
                expected: CLASSES.len(),
                got: probs.len(),
            });
        }
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        let percent = |p: f32| f64::from(p) * 100.0;
        let all_predictions = CLASSES
            .iter()
            .zip(probs)
            .map(|(class, p)| (*class, round2(percent(*p))))
            .collect();

        Ok(Self {
            label: CLASSES[best],
            raw_confidence: percent(probs[best]),
            confidence: round2(percent(probs[best])),
            all_predictions,
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
