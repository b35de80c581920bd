//! Email one-time codes.
//!
//! One live record per email address, whatever its purpose; issuing a new
//! code replaces the old one. A record moves `pending -> verified` on the
//! right code and is removed when it expires, runs out of attempts, or is
//! consumed by registration / password reset.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Register,
    Reset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Register => "register",
            OtpPurpose::Reset => "reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "register" => Ok(OtpPurpose::Register),
            "reset" => Ok(OtpPurpose::Reset),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub email: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub verified: bool,
    pub expires_at: OffsetDateTime,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("OTP not found")]
    NotFound,
    #[error("Invalid OTP purpose")]
    PurposeMismatch,
    #[error("OTP expired")]
    Expired,
    #[error("Too many wrong attempts")]
    TooManyAttempts,
    #[error("Invalid OTP")]
    InvalidCode,
    #[error("Email OTP not verified")]
    NotVerified,
}

/// Keyed storage for OTP records.
///
/// `update` must run the closure while holding whatever guards the entry, so
/// a verification is one read-modify-write per email.
pub trait OtpStore: Send + Sync {
    fn put(&self, record: OtpRecord);
    fn get(&self, email: &str) -> Option<OtpRecord>;
    fn remove(&self, email: &str) -> Option<OtpRecord>;
    fn update(&self, email: &str, apply: &mut dyn FnMut(&mut Option<OtpRecord>));
}

/// Process-local store. Lost on restart and not shared between instances.
#[derive(Default)]
pub struct InMemoryOtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, OtpRecord>> {
        // A panic while holding the lock leaves whole records behind, never torn ones.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OtpStore for InMemoryOtpStore {
    fn put(&self, record: OtpRecord) {
        self.lock().insert(record.email.clone(), record);
    }

    fn get(&self, email: &str) -> Option<OtpRecord> {
        self.lock().get(email).cloned()
    }

    fn remove(&self, email: &str) -> Option<OtpRecord> {
        self.lock().remove(email)
    }

    fn update(&self, email: &str, apply: &mut dyn FnMut(&mut Option<OtpRecord>)) {
        let mut map = self.lock();
        let mut slot = map.remove(email);
        apply(&mut slot);
        if let Some(record) = slot {
            map.insert(email.to_string(), record);
        }
    }
}

/// Issues and checks codes against an injected [`OtpStore`].
#[derive(Clone)]
pub struct OtpManager {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpManager {
    pub fn new(store: Arc<dyn OtpStore>, ttl: Duration, max_attempts: u32) -> Self {
        Self {
            store,
            ttl,
            max_attempts,
        }
    }

    pub fn issue(&self, email: &str, purpose: OtpPurpose) -> OtpRecord {
        self.issue_at(email, purpose, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, email: &str, purpose: OtpPurpose, now: OffsetDateTime) -> OtpRecord {
        let record = OtpRecord {
            email: email.to_string(),
            code: generate_code(),
            purpose,
            verified: false,
            expires_at: now + self.ttl,
            attempts: 0,
        };
        self.store.put(record.clone());
        debug!(email, purpose = %purpose, "otp issued");
        record
    }

    pub fn verify(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<(), OtpError> {
        self.verify_at(email, code, purpose, OffsetDateTime::now_utc())
    }

    pub fn verify_at(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: OffsetDateTime,
    ) -> Result<(), OtpError> {
        let max_attempts = self.max_attempts;
        let mut outcome = Err(OtpError::NotFound);
        self.store.update(email, &mut |slot: &mut Option<OtpRecord>| {
            outcome = check_code(slot, code, purpose, now, max_attempts);
        });
        if let Err(e) = &outcome {
            warn!(email, purpose = %purpose, error = %e, "otp verification failed");
        }
        outcome
    }

    /// Succeeds when `email` holds a verified record issued for `purpose`.
    pub fn require_verified(&self, email: &str, purpose: OtpPurpose) -> Result<(), OtpError> {
        let record = self.store.get(email).ok_or(OtpError::NotFound)?;
        if record.purpose != purpose {
            return Err(OtpError::PurposeMismatch);
        }
        if !record.verified {
            return Err(OtpError::NotVerified);
        }
        Ok(())
    }

    /// Drops the record for `email`; called once its purpose is fulfilled.
    pub fn remove(&self, email: &str) {
        self.store.remove(email);
    }
}

fn check_code(
    slot: &mut Option<OtpRecord>,
    code: &str,
    purpose: OtpPurpose,
    now: OffsetDateTime,
    max_attempts: u32,
) -> Result<(), OtpError> {
    let Some(record) = slot.as_mut() else {
        return Err(OtpError::NotFound);
    };
    // An accepted code cannot be accepted twice; the record only gates the next step now.
    if record.verified {
        return Err(OtpError::NotFound);
    }
    if record.purpose != purpose {
        return Err(OtpError::PurposeMismatch);
    }
    if now > record.expires_at {
        *slot = None;
        return Err(OtpError::Expired);
    }
    if record.attempts >= max_attempts {
        *slot = None;
        return Err(OtpError::TooManyAttempts);
    }
    if constant_time_eq(record.code.as_bytes(), code.trim().as_bytes()) {
        record.verified = true;
        Ok(())
    } else {
        record.attempts += 1;
        Err(OtpError::InvalidCode)
    }
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
