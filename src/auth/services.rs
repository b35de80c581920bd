use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::Role,
        jwt::JwtKeys,
        otp::{OtpError, OtpManager, OtpPurpose},
        password::{self, hash_password, verify_password},
        repo_types::{NewUser, User},
    },
    db::Repository,
    errors::AppError,
    mailer::{otp_mail, MailError, Mailer},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

lazy_static! {
    static ref LOOSE_EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref STRICT_EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// Shape check used before sending a code.
pub(crate) fn is_valid_email(email: &str) -> bool {
    LOOSE_EMAIL_RE.is_match(email)
}

/// Stricter check applied when an account is actually created.
pub(crate) fn is_registrable_email(email: &str) -> bool {
    STRICT_EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Email already registered")]
    AlreadyRegistered,
    #[error("Email not registered")]
    NotRegistered,
    #[error("{0}")]
    Otp(#[from] OtpError),
    #[error("{0}")]
    Validation(String),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email not found")]
    EmailNotFound,
    #[error("Profile not found")]
    UserNotFound,
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::Credentials(INVALID_CREDENTIALS.into()),
            AuthError::EmailNotFound | AuthError::UserNotFound => AppError::NotFound(e.to_string()),
            AuthError::Mail(inner) => AppError::ExternalService(inner.to_string()),
            AuthError::Internal(inner) => AppError::Internal(inner),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Email-OTP gated account lifecycle: registration, login, password reset.
pub struct AuthService {
    repo: Arc<dyn Repository>,
    otp: OtpManager,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    mail_from: String,
    otp_valid_minutes: i64,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn Repository>,
        otp: OtpManager,
        mailer: Arc<dyn Mailer>,
        keys: JwtKeys,
        mail_from: String,
        otp_valid_minutes: i64,
    ) -> Self {
        Self {
            repo,
            otp,
            mailer,
            keys,
            mail_from,
            otp_valid_minutes,
        }
    }

    pub async fn request_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let exists = self.repo.find_user_by_email(&email).await?.is_some();
        match purpose {
            OtpPurpose::Register if exists => return Err(AuthError::AlreadyRegistered),
            OtpPurpose::Reset if !exists => return Err(AuthError::NotRegistered),
            _ => {}
        }

        let record = self.otp.issue(&email, purpose);
        let mail = otp_mail(
            &self.mail_from,
            &email,
            &record.code,
            purpose.as_str(),
            self.otp_valid_minutes,
        );
        if let Err(e) = self.mailer.send(mail).await {
            // The code never reached the user, so it must not stay redeemable.
            self.otp.remove(&email);
            error!(email = %email, error = %e, "otp email failed");
            return Err(e.into());
        }

        info!(email = %email, purpose = %purpose, "otp sent");
        Ok(())
    }

    pub fn verify_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<(), AuthError> {
        let email = normalize_email(email);
        self.otp.verify(&email, code, purpose)?;
        info!(email = %email, purpose = %purpose, "otp verified");
        Ok(())
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("All fields are required".into()));
        }
        if !password::is_long_enough(password) {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                password::MIN_PASSWORD_LEN
            )));
        }
        if !is_registrable_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        self.otp.require_verified(&email, OtpPurpose::Register)?;

        if self.repo.find_user_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .repo
            .create_user(NewUser {
                name: name.to_string(),
                email: email.clone(),
                password_hash,
                role,
            })
            .await?
            .ok_or_else(|| {
                warn!(email = %email, "email taken at insert");
                AuthError::EmailTaken
            })?;

        self.otp.remove(&email);
        info!(user_id = %user.id, email = %user.email, role = %role, "user registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);

        let user = match self.repo.find_user_by_email(&email).await? {
            Some(u) => u,
            None => {
                password::verify_dummy(password);
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.keys.sign(&user)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(LoginOutcome { token, user })
    }

    pub async fn reset_password(&self, email: &str, new_password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        if !password::is_long_enough(new_password) {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                password::MIN_PASSWORD_LEN
            )));
        }

        self.otp
            .require_verified(&email, OtpPurpose::Reset)
            .map_err(|e| {
                warn!(email = %email, error = %e, "reset without verified otp");
                AuthError::Validation("Email OTP verification required".into())
            })?;

        let password_hash = hash_password(new_password)?;
        let updated = self.repo.update_password(&email, &password_hash).await?;
        if updated == 0 {
            return Err(AuthError::EmailNotFound);
        }

        self.otp.remove(&email);
        info!(email = %email, "password reset");
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.repo
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.repo.list_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::otp::InMemoryOtpStore,
        config::JwtConfig,
        testing::{MemoryRepository, RecordingMailer},
    };
    use time::Duration;

    struct Fixture {
        service: AuthService,
        mailer: Arc<RecordingMailer>,
        repo: Arc<MemoryRepository>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let otp = OtpManager::new(Arc::new(InMemoryOtpStore::new()), Duration::minutes(5), 3);
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 60,
        });
        let service = AuthService::new(
            repo.clone(),
            otp,
            mailer.clone(),
            keys,
            "no-reply@test.local".into(),
            5,
        );
        Fixture {
            service,
            mailer,
            repo,
        }
    }

    async fn register_verified(f: &Fixture, email: &str, password: &str) -> User {
        f.service
            .request_otp(email, OtpPurpose::Register)
            .await
            .expect("otp sent");
        let code = f.mailer.last_code_for(email).expect("code mailed");
        f.service
            .verify_otp(email, &code, OtpPurpose::Register)
            .expect("otp verified");
        f.service
            .register("Ada Lovelace", email, password, Role::Doctor)
            .await
            .expect("registered")
    }

    #[tokio::test]
    async fn request_otp_rejects_bad_email() {
        let f = fixture();
        let err = f
            .service
            .request_otp("not-an-email", OtpPurpose::Register)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn request_otp_checks_registration_state() {
        let f = fixture();
        let err = f
            .service
            .request_otp("ghost@example.com", OtpPurpose::Reset)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotRegistered));

        register_verified(&f, "ada@example.com", "secret1").await;
        let err = f
            .service
            .request_otp("ada@example.com", OtpPurpose::Register)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn request_otp_normalizes_email() {
        let f = fixture();
        f.service
            .request_otp("  Ada@Example.COM ", OtpPurpose::Register)
            .await
            .unwrap();
        assert!(f.mailer.last_code_for("ada@example.com").is_some());
    }

    #[tokio::test]
    async fn mail_failure_is_reported_and_code_dropped() {
        let f = fixture();
        f.mailer.fail_next();
        let err = f
            .service
            .request_otp("ada@example.com", OtpPurpose::Register)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Mail(_)));
        let err = f
            .service
            .verify_otp("ada@example.com", "123456", OtpPurpose::Register)
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::NotFound)));
    }

    #[tokio::test]
    async fn register_requires_verified_otp() {
        let f = fixture();
        let err = f
            .service
            .register("Ada", "ada@example.com", "secret1", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::NotFound)));

        f.service
            .request_otp("ada@example.com", OtpPurpose::Register)
            .await
            .unwrap();
        let err = f
            .service
            .register("Ada", "ada@example.com", "secret1", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::NotVerified)));
    }

    #[tokio::test]
    async fn register_password_length_boundary() {
        let f = fixture();
        f.service
            .request_otp("ada@example.com", OtpPurpose::Register)
            .await
            .unwrap();
        let code = f.mailer.last_code_for("ada@example.com").unwrap();
        f.service
            .verify_otp("ada@example.com", &code, OtpPurpose::Register)
            .unwrap();

        let err = f
            .service
            .register("Ada", "ada@example.com", "12345", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let user = f
            .service
            .register("Ada", "ada@example.com", "123456", Role::Patient)
            .await
            .expect("six characters is enough");
        assert_eq!(user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn register_consumes_otp_and_stores_argon2_hash() {
        let f = fixture();
        let user = register_verified(&f, "ada@example.com", "secret1").await;
        assert!(user.password_hash.starts_with("$argon2"));
        assert_eq!(user.role(), Role::Doctor);

        let err = f
            .service
            .register("Ada", "ada@example.com", "secret1", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Otp(OtpError::NotFound)));
    }

    #[tokio::test]
    async fn register_rejects_email_taken_after_verification() {
        let f = fixture();
        f.service
            .request_otp("ada@example.com", OtpPurpose::Register)
            .await
            .unwrap();
        let code = f.mailer.last_code_for("ada@example.com").unwrap();
        f.service
            .verify_otp("ada@example.com", &code, OtpPurpose::Register)
            .unwrap();
        // another request won the race after the OTP was verified
        f.repo.insert_raw("ada@example.com", "Other", "x");

        let err = f
            .service
            .register("Ada", "ada@example.com", "secret1", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn login_errors_are_indistinguishable() {
        let f = fixture();
        register_verified(&f, "ada@example.com", "secret1").await;

        let unknown = f
            .service
            .login("nobody@example.com", "secret1")
            .await
            .unwrap_err();
        let wrong = f
            .service
            .login("ada@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let a = AppError::from(unknown);
        let b = AppError::from(wrong);
        assert_eq!(a.status(), b.status());
        assert_eq!(a.to_string(), b.to_string());
    }

    #[tokio::test]
    async fn register_login_profile_roundtrip() {
        let f = fixture();
        let registered = register_verified(&f, "ada@example.com", "secret1").await;
        let outcome = f.service.login("ADA@example.com", "secret1").await.unwrap();
        assert!(!outcome.token.is_empty());

        let profile = f.service.profile(outcome.user.id).await.unwrap();
        assert_eq!(profile.id, registered.id);
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.role(), Role::Doctor);
    }

    #[tokio::test]
    async fn reset_password_flow() {
        let f = fixture();
        register_verified(&f, "ada@example.com", "secret1").await;

        let err = f
            .service
            .reset_password("ada@example.com", "newsecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        f.service
            .request_otp("ada@example.com", OtpPurpose::Reset)
            .await
            .unwrap();
        let code = f.mailer.last_code_for("ada@example.com").unwrap();
        f.service
            .verify_otp("ada@example.com", &code, OtpPurpose::Reset)
            .unwrap();

        let err = f
            .service
            .reset_password("ada@example.com", "short")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        f.service
            .reset_password("ada@example.com", "newsecret")
            .await
            .unwrap();
        assert!(f.service.login("ada@example.com", "secret1").await.is_err());
        assert!(f.service.login("ada@example.com", "newsecret").await.is_ok());

        // the verified record was consumed
        let err = f
            .service
            .reset_password("ada@example.com", "another1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn reset_password_reports_missing_row() {
        let f = fixture();
        register_verified(&f, "ada@example.com", "secret1").await;
        f.service
            .request_otp("ada@example.com", OtpPurpose::Reset)
            .await
            .unwrap();
        let code = f.mailer.last_code_for("ada@example.com").unwrap();
        f.service
            .verify_otp("ada@example.com", &code, OtpPurpose::Reset)
            .unwrap();
        f.repo.delete_user("ada@example.com");

        let err = f
            .service
            .reset_password("ada@example.com", "newsecret")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotFound));
    }

    #[test]
    fn email_checks() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(is_registrable_email("first.last+tag@mail.example.org"));
        assert!(!is_registrable_email("ada@example.c"));
    }
}
