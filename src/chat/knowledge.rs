use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// One curated question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: u64,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeDocument {
    #[serde(default)]
    questions: Vec<KnowledgeEntry>,
}

/// Read-only FAQ corpus, in document order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeStore {
    /// Reads `{"questions": [...]}` from `path`. Any failure yields an empty store.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "knowledge base file not found");
                return Self::default();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "knowledge base unreadable");
                return Self::default();
            }
        };

        match serde_json::from_str::<KnowledgeDocument>(&raw) {
            Ok(doc) => {
                let store = Self::from_entries(doc.questions);
                info!(path = %path.display(), entries = store.len(), "knowledge base loaded");
                store
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "knowledge base malformed");
                Self::default()
            }
        }
    }

    /// Keeps the first entry for each id.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| {
                let fresh = seen.insert(e.id);
                if !fresh {
                    warn!(id = e.id, "duplicate knowledge base id dropped");
                }
                fresh
            })
            .collect();
        Self { entries }
    }

    pub fn all(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn by_category(&self, category: &str) -> Vec<&KnowledgeEntry> {
        self.entries
            .iter()
            .filter(|e| e.category.as_deref() == Some(category))
            .collect()
    }

    /// Entries tagged with any of `keywords`, compared case-insensitively.
    pub fn search_keywords<S: AsRef<str>>(&self, keywords: &[S]) -> Vec<&KnowledgeEntry> {
        let wanted: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.entries
            .iter()
            .filter(|e| {
                e.keywords
                    .iter()
                    .any(|kw| wanted.contains(&kw.to_lowercase()))
            })
            .collect()
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for cat in self.entries.iter().filter_map(|e| e.category.as_deref()) {
            if !out.contains(&cat) {
                out.push(cat);
            }
        }
        out
    }
}
