use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Email delivery timed out")]
    Timeout,
    #[error("Email relay rejected the message (status {0})")]
    Rejected(u16),
    #[error("Email delivery failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl RelayMailer {
    pub fn new(url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let mut req = self.client.post(&self.url).json(&mail);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.map_err(|e| {
            if e.is_timeout() {
                MailError::Timeout
            } else {
                MailError::Transport(e.to_string())
            }
        })?;
        if !res.status().is_success() {
            return Err(MailError::Rejected(res.status().as_u16()));
        }
        debug!(to = %mail.to, "mail accepted by relay");
        Ok(())
    }
}

/// Development mailer: writes the message to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, body = %mail.text, "mail relay not configured; logging message");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match &cfg.relay_url {
        Some(url) => Arc::new(RelayMailer::new(url, cfg.relay_token.clone())?),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set; OTP codes will only be logged");
            Arc::new(LogMailer)
        }
    };
    Ok(mailer)
}

pub fn otp_mail(from: &str, to: &str, code: &str, purpose: &str, valid_minutes: i64) -> OutgoingMail {
    OutgoingMail {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Brain Tumor Medical Assistant - OTP Verification".into(),
        text: format!(
            "Your one-time password (OTP) is: {code}\n\n\
             Purpose: {}\n\
             Validity: {valid_minutes} minutes\n\n\
             If you did not request this, please ignore this email.\n",
            purpose.to_uppercase()
        ),
    }
}
