//! In-memory stand-ins for the external collaborators, shared by unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    chat::{
        embedder::{EmbeddingError, TextEmbedder},
        knowledge::{KnowledgeEntry, KnowledgeStore},
    },
    db::Repository,
    mailer::{MailError, Mailer, OutgoingMail},
    scans::{
        classifier::{ClassifierError, ScanClassifier},
        repo_types::{NewScan, ScanRecord},
    },
};

#[derive(Default)]
pub struct MemoryRepository {
    users: Mutex<Vec<User>>,
    scans: Mutex<Vec<ScanRecord>>,
}

impl MemoryRepository {
    /// Inserts a user directly, bypassing the auth flow.
    pub fn insert_raw(&self, email: &str, name: &str, password_hash: &str) {
        self.users.lock().unwrap().push(User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: "patient".into(),
            created_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn delete_user(&self, email: &str) {
        self.users.lock().unwrap().retain(|u| u.email != email);
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role.as_str().into(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(created.clone());
        Ok(Some(created))
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<u64> {
        let mut updated = 0;
        for u in self.users.lock().unwrap().iter_mut() {
            if u.email == email {
                u.password_hash = password_hash.into();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn insert_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord> {
        let record = ScanRecord {
            id: Uuid::new_v4(),
            user_id: scan.user_id,
            prediction: scan.prediction,
            confidence: scan.confidence,
            patient_name: scan.patient.name,
            patient_age: scan.patient.age,
            patient_gender: scan.patient.gender,
            scanned_at: OffsetDateTime::now_utc(),
        };
        self.scans.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_scans(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<ScanRecord>> {
        // insertion order stands in for scanned_at, which can tie within a test
        Ok(self
            .scans
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail_next: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The six-digit code from the latest mail to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let mail = sent.iter().rev().find(|m| m.to == to)?;
        mail.text
            .split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MailError::Timeout);
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

const VOCAB_DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each distinct word gets its own axis.
#[derive(Default)]
pub struct VocabEmbedder {
    vocab: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl VocabEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl TextEmbedder for VocabEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EmbeddingError::Failed("injected failure".into()));
        }
        let mut vocab = self.vocab.lock().unwrap();
        let mut v = vec![0.0; VOCAB_DIMENSIONS];
        for word in text.split_whitespace() {
            let next = vocab.len();
            let axis = *vocab.entry(word.to_string()).or_insert(next);
            v[axis % VOCAB_DIMENSIONS] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        VOCAB_DIMENSIONS
    }
}

/// Returns the same probabilities for every image.
pub struct FixedClassifier {
    pub probabilities: Vec<f32>,
}

impl Default for FixedClassifier {
    fn default() -> Self {
        Self {
            probabilities: vec![0.9, 0.05, 0.03, 0.02],
        }
    }
}

#[async_trait]
impl ScanClassifier for FixedClassifier {
    async fn classify(&self, _image: Bytes, _content_type: &str) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.probabilities.clone())
    }
}

pub fn kb_entry(id: u64, question: &str, category: Option<&str>) -> KnowledgeEntry {
    KnowledgeEntry {
        id,
        question: question.into(),
        answer: format!("answer {id}"),
        category: category.map(Into::into),
        keywords: Vec::new(),
    }
}

pub fn sample_knowledge() -> KnowledgeStore {
    let mut glioma = kb_entry(3, "What is a glioma?", Some("tumor_types"));
    glioma.keywords = vec!["glioma".into(), "glial cells".into()];
    KnowledgeStore::from_entries(vec![
        kb_entry(1, "What is a brain tumor?", Some("general")),
        kb_entry(2, "What are the common symptoms of a brain tumor?", Some("symptoms")),
        glioma,
    ])
}
