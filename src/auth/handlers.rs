use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::Role,
        dto::{
            LoginRequest, LoginResponse, MessageResponse, Profile, ProfileResponse, PublicUser,
            RegisterRequest, ResetPasswordRequest, SendOtpRequest, UserListResponse,
            VerifyOtpRequest,
        },
        jwt::{AdminUser, AuthUser},
        otp::OtpPurpose,
    },
    errors::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/send-email-otp", post(send_email_otp))
        .route("/auth/verify-email-otp", post(verify_email_otp))
        .route("/auth/register-user", post(register_user))
        .route("/auth/login-user", post(login_user))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/logout", post(logout))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/admin/users", get(list_users))
}

fn parse_purpose(raw: &str) -> Option<OtpPurpose> {
    raw.trim().parse().ok()
}

#[instrument(skip(state, payload))]
pub async fn send_email_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SendOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let purpose = payload.purpose.as_deref().and_then(parse_purpose);
    let purpose = match purpose {
        Some(p) if !payload.email.trim().is_empty() => p,
        _ => return Err(AppError::validation("Email and purpose required")),
    };

    state.auth.request_otp(&payload.email, purpose).await?;
    Ok(Json(MessageResponse::ok("OTP sent to email")))
}

#[instrument(skip(state, payload))]
pub async fn verify_email_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if payload.email.trim().is_empty() || payload.otp.trim().is_empty() {
        return Err(AppError::validation("Email and OTP required"));
    }
    let purpose = parse_purpose(&payload.purpose).ok_or_else(|| {
        warn!(purpose = %payload.purpose, "unknown otp purpose");
        AppError::validation("Invalid OTP purpose")
    })?;

    state
        .auth
        .verify_otp(&payload.email, &payload.otp, purpose)?;
    Ok(Json(MessageResponse::ok("OTP verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let role = match payload.role.as_deref().map(str::trim) {
        None | Some("") => Role::default(),
        Some(raw) => raw.parse::<Role>().map_err(AppError::Validation)?,
    };

    state
        .auth
        .register(&payload.name, &payload.email, payload.password.trim(), role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::ok("Account created successfully")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let password = payload.password.trim();
    if payload.email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password required"));
    }

    let outcome = state.auth.login(&payload.email, password).await?;
    Ok(Json(LoginResponse {
        success: true,
        token: outcome.token,
        user: PublicUser::from(&outcome.user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let new_password = payload.new_password.trim();
    if payload.email.trim().is_empty() || new_password.is_empty() {
        return Err(AppError::validation("Email and new password required"));
    }

    state
        .auth
        .reset_password(&payload.email, new_password)
        .await?;
    Ok(Json(MessageResponse::ok("Password reset successful")))
}

/// Tokens are stateless; the client drops its copy.
#[instrument(skip_all)]
pub async fn logout(AuthUser(claims): AuthUser) -> Json<MessageResponse> {
    info!(user_id = %claims.sub, "user logged out");
    Json(MessageResponse::ok("Logged out successfully"))
}

#[instrument(skip(state, claims))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state.auth.profile(claims.sub).await?;
    Ok(Json(ProfileResponse {
        success: true,
        profile: Profile::from(user),
    }))
}

#[instrument(skip(state, claims))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
) -> Result<Json<UserListResponse>, AppError> {
    let users: Vec<Profile> = state
        .auth
        .list_users()
        .await?
        .into_iter()
        .map(Profile::from)
        .collect();
    info!(admin_id = %claims.sub, count = users.len(), "users listed");
    Ok(Json(UserListResponse {
        success: true,
        count: users.len(),
        users,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn purpose_parsing_is_strict() {
        assert_eq!(parse_purpose("register"), Some(OtpPurpose::Register));
        assert_eq!(parse_purpose(" reset "), Some(OtpPurpose::Reset));
        assert_eq!(parse_purpose(""), None);
        assert_eq!(parse_purpose("login"), None);
    }

    #[test]
    fn public_user_hides_password_hash() {
        let user = crate::auth::repo_types::User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: "doctor".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert_eq!(json["role"], "doctor");
        assert_eq!(json["email"], "ada@example.com");
        assert!(json.get("password_hash").is_none());

        let json = serde_json::to_value(Profile::from(user)).unwrap();
        assert!(json["created_at"].is_string());
    }
}
