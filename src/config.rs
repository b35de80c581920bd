use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_FALLBACK_ANSWER: &str = "I'm sorry, I don't have specific information about that. \
Please consult a medical professional for accurate diagnosis and treatment advice.";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_seconds: i64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub knowledge_base_path: PathBuf,
    pub model: String,
    pub cache_dir: PathBuf,
    pub similarity_threshold: f32,
    pub fallback_answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP relay endpoint; when unset, codes are only written to the log.
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub assistant: AssistantConfig,
    pub mail: MailConfig,
    pub classifier_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "neuroassist".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "neuroassist-users".into()),
            ttl_minutes: parse_or(&lookup, "JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let otp = OtpConfig {
            ttl_seconds: parse_or(&lookup, "OTP_TTL_SECONDS", 300),
            max_attempts: parse_or(&lookup, "OTP_MAX_ATTEMPTS", 3),
        };
        let assistant = AssistantConfig {
            knowledge_base_path: lookup("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|| "data/knowledge_base.json".into())
                .into(),
            model: lookup("EMBEDDING_MODEL").unwrap_or_else(|| "all-MiniLM-L6-v2".into()),
            cache_dir: lookup("EMBEDDING_CACHE_DIR")
                .unwrap_or_else(|| ".fastembed_cache".into())
                .into(),
            similarity_threshold: parse_or(&lookup, "SIMILARITY_THRESHOLD", 0.5),
            fallback_answer: lookup("ASSISTANT_FALLBACK_ANSWER")
                .unwrap_or_else(|| DEFAULT_FALLBACK_ANSWER.into()),
        };
        let mail = MailConfig {
            relay_url: lookup("MAIL_RELAY_URL").filter(|v| !v.is_empty()),
            relay_token: lookup("MAIL_RELAY_TOKEN").filter(|v| !v.is_empty()),
            from: lookup("MAIL_FROM").unwrap_or_else(|| "no-reply@neuroassist.local".into()),
        };
        let classifier_url = lookup("CLASSIFIER_URL").filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt,
            otp,
            assistant,
            mail,
            classifier_url,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
