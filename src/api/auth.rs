use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{validate_email, validate_name, validate_otp, validate_password};
use crate::auth::rbac::{authorize, Actor, Operation};
use crate::auth::{hash_password, OtpPurpose, ReplaceAuthorization};
use crate::clock::format_ts;
use crate::config::AuthConfig;
use crate::db::{DbPool, Identity, LoginRequest, LoginResponse, Role};
use crate::error::Error;
use crate::AppState;

/// Response for setup status check
#[derive(Serialize)]
pub struct SetupStatusResponse {
    pub needs_setup: bool,
}

/// Request for initial setup
#[derive(Deserialize)]
pub struct SetupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub password: String,
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity = match state
        .credentials
        .authenticate(&request.email, &request.password)
        .await
    {
        Ok(identity) => identity,
        Err(Error::Unauthenticated) => {
            warn!("Login failed: invalid credentials");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => {
            if matches!(e, Error::Forbidden(_)) {
                warn!("Login refused for inactive account");
            }
            return Err(e.into());
        }
    };

    let token = state.tokens.issue_at(&identity, state.clock.now())?;
    info!(identity_id = %identity.id, role = %identity.role, "Login succeeded");

    Ok(Json(LoginResponse {
        token,
        user: identity.into(),
    }))
}

/// Start a password reset by mailing a passcode
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SendOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_email(&request.email).map_err(|e| ApiError::validation_field("email", e))?;

    let identity = find_account(&state, &request.email).await?;
    if !identity.is_active() {
        return Err(ApiError::forbidden("Account is inactive"));
    }

    state
        .otp
        .issue(&identity.id, OtpPurpose::PasswordReset, &identity.email)
        .await?;

    Ok(Json(json!({ "message": "OTP sent to your email" })))
}

/// Consume a password-reset passcode and open the reset window
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifyOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("otp", validate_otp(&request.otp));
    errors.finish()?;

    let identity = find_account(&state, &request.email).await?;
    state
        .otp
        .verify(&identity.id, OtpPurpose::PasswordReset, &request.otp)
        .await?;
    state.credentials.grant_reset(&identity.id).await?;

    Ok(Json(json!({ "message": "OTP verified successfully" })))
}

/// Replace the password after a verified passcode
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.finish()?;

    let identity = find_account(&state, &request.email).await?;
    if !identity.is_active() {
        return Err(ApiError::forbidden("Account is inactive"));
    }
    state
        .credentials
        .replace(&identity.id, &request.password, ReplaceAuthorization::OtpVerified)
        .await?;

    Ok(Json(json!({ "message": "Password changed successfully" })))
}

async fn find_account(state: &AppState, email: &str) -> Result<Identity, ApiError> {
    state
        .credentials
        .find_by_email(email)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))
}

async fn admin_exists(db: &DbPool) -> Result<bool, sqlx::Error> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT id FROM identities WHERE role = ? LIMIT 1")
            .bind(Role::Admin)
            .fetch_optional(db)
            .await?;
    Ok(found.is_some())
}

/// Insert an Admin unless one already exists. Returns the new id, or `None`
/// when an Admin was already present.
async fn create_first_admin(
    db: &DbPool,
    name: &str,
    email: &str,
    password: &str,
    now: &str,
) -> Result<Option<String>, Error> {
    let password_hash = hash_password(password)
        .map_err(|e| Error::internal(format!("failed to hash password: {}", e)))?;
    let id = uuid::Uuid::new_v4().to_string();

    let result = sqlx::query(
        r#"
        INSERT INTO identities (id, name, email, password_hash, role, created_at, updated_at)
        SELECT ?, ?, ?, ?, ?, ?, ?
        WHERE NOT EXISTS (SELECT 1 FROM identities WHERE role = ?)
        "#,
    )
    .bind(&id)
    .bind(name.trim())
    .bind(email.trim())
    .bind(&password_hash)
    .bind(Role::Admin)
    .bind(now)
    .bind(now)
    .bind(Role::Admin)
    .execute(db)
    .await?;

    Ok((result.rows_affected() == 1).then_some(id))
}

/// Check if initial setup is needed (no admin exists)
pub async fn setup_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SetupStatusResponse>, ApiError> {
    Ok(Json(SetupStatusResponse {
        needs_setup: !admin_exists(&state.db).await?,
    }))
}

/// Initial setup endpoint - creates the first admin
pub async fn setup(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SetupRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.check("name", validate_name(&request.name, "Name"));
    errors.finish()?;

    let now = format_ts(state.clock.now());
    let id = create_first_admin(&state.db, &request.name, &request.email, &request.password, &now)
        .await?
        .ok_or_else(|| ApiError::forbidden("Setup has already been completed"))?;

    let identity = state
        .credentials
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::internal("Admin vanished after setup"))?;

    info!(identity_id = %identity.id, "Created admin during setup");

    let token = state.tokens.issue_at(&identity, state.clock.now())?;
    Ok(Json(LoginResponse {
        token,
        user: identity.into(),
    }))
}

/// Create the configured bootstrap admin when no admin exists yet
pub async fn ensure_bootstrap_admin(db: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&auth.bootstrap_admin_email, &auth.bootstrap_admin_password)
    else {
        return Ok(());
    };

    let now = format_ts(chrono::Utc::now());
    match create_first_admin(db, &auth.bootstrap_admin_name, email, password, &now).await? {
        Some(id) => info!(identity_id = %id, "Created bootstrap admin"),
        None => tracing::debug!("Admin already exists, skipping bootstrap"),
    }
    Ok(())
}

/// Extract the bearer token from request headers
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the session token and attach the caller to the request
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let claims = state.tokens.verify(token)?;

    request.extensions_mut().insert(claims.actor());
    Ok(next.run(request).await)
}

/// Per-route role gate; runs after `auth_middleware`
pub async fn require(
    operation: Operation,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = request
        .extensions()
        .get::<Actor>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    authorize(actor, operation)?;
    Ok(next.run(request).await)
}
