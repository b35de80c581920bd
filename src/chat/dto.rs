use serde::{Deserialize, Serialize};

use crate::chat::knowledge::KnowledgeEntry;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub answer: String,
    pub confidence: f64,
    pub category: String,
    pub matched: bool,
}

/// Filters for `GET /faq`. `keyword` accepts a comma-separated list.
#[derive(Debug, Default, Deserialize)]
pub struct FaqFilter {
    pub category: Option<String>,
    pub keyword: Option<String>,
}

impl FaqFilter {
    pub fn keywords(&self) -> Vec<&str> {
        self.keyword
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct FaqListResponse {
    pub success: bool,
    pub count: usize,
    pub categories: Vec<String>,
    pub questions: Vec<KnowledgeEntry>,
}

#[derive(Debug, Serialize)]
pub struct FaqEntryResponse {
    pub success: bool,
    pub question: KnowledgeEntry,
}
