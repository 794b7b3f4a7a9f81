//! Admin-only account endpoints: the admin's own profile and employee accounts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{
    validate_email, validate_name, validate_otp, validate_password, validate_phone,
};
use crate::auth::{hash_password, Actor, OtpPurpose, ReplaceAuthorization};
use crate::clock::format_ts;
use crate::db::{
    CreateIdentityRequest, Identity, IdentityResponse, IdentityStatus, UpdateIdentityStatusRequest,
    UpdateProfileRequest,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileVerifyRequest {
    pub email: String,
    pub otp: String,
}

async fn load_identity(state: &AppState, id: &str) -> Result<Identity, ApiError> {
    state
        .credentials
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))
}

fn email_taken(err: sqlx::Error) -> ApiError {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        ApiError::conflict("Email is already in use")
    } else {
        err.into()
    }
}

fn normalize_phone(phone: Option<String>) -> Option<String> {
    phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// GET /api/admin/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<IdentityResponse>, ApiError> {
    Ok(Json(load_identity(&state, &actor.id).await?.into()))
}

/// PUT /api/admin/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let password = request.password.filter(|p| !p.is_empty());

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &request.name {
        errors.check("name", validate_name(name, "Name"));
    }
    errors.check("phone", validate_phone(&request.phone));
    if let Some(password) = &password {
        errors.check("password", validate_password(password));
    }
    errors.finish()?;

    let now = format_ts(state.clock.now());
    let name = request.name.as_deref().map(str::trim);
    let phone = normalize_phone(request.phone);

    sqlx::query(
        "UPDATE identities SET name = COALESCE(?, name), phone = COALESCE(?, phone), updated_at = ? WHERE id = ?",
    )
    .bind(name)
    .bind(&phone)
    .bind(&now)
    .bind(&actor.id)
    .execute(&state.db)
    .await?;

    if let Some(password) = password {
        state
            .credentials
            .replace(
                &actor.id,
                &password,
                ReplaceAuthorization::OwnSession { actor_id: &actor.id },
            )
            .await?;
    }

    info!(identity_id = %actor.id, "Profile updated");
    Ok(Json(load_identity(&state, &actor.id).await?.into()))
}

/// POST /api/admin/profile/send-otp
///
/// Mails a passcode to the address the admin wants to switch to.
pub async fn send_email_change_otp(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(request): ApiJson<ProfileEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_email(&request.email).map_err(|e| ApiError::validation_field("email", e))?;

    if let Some(existing) = state.credentials.find_by_email(&request.email).await? {
        if existing.id != actor.id {
            return Err(ApiError::conflict("Email is already in use"));
        }
    }

    state
        .otp
        .issue(&actor.id, OtpPurpose::EmailChange, &request.email)
        .await?;

    Ok(Json(json!({ "message": "OTP sent to the new email address" })))
}

/// POST /api/admin/profile/verify-otp
pub async fn verify_email_change_otp(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(request): ApiJson<ProfileVerifyRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("otp", validate_otp(&request.otp));
    errors.finish()?;

    let challenge = state
        .otp
        .verify(&actor.id, OtpPurpose::EmailChange, &request.otp)
        .await?;

    let email = request.email.trim().to_lowercase();
    if challenge.target != email {
        return Err(ApiError::validation_field(
            "email",
            "Email does not match the address the passcode was sent to",
        ));
    }

    sqlx::query("UPDATE identities SET email = ?, updated_at = ? WHERE id = ?")
        .bind(&email)
        .bind(format_ts(state.clock.now()))
        .bind(&actor.id)
        .execute(&state.db)
        .await
        .map_err(email_taken)?;

    info!(identity_id = %actor.id, "Admin email changed");
    Ok(Json(load_identity(&state, &actor.id).await?.into()))
}

/// POST /api/admin/employees
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateIdentityRequest>,
) -> Result<(StatusCode, Json<IdentityResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&request.name, "Name"));
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.check("phone", validate_phone(&request.phone));
    let department_id = if request.role.requires_department() {
        match request.department_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => {
                errors.add("department_id", "Department is required for this role");
                None
            }
        }
    } else {
        None
    };
    errors.finish()?;

    if let Some(department_id) = &department_id {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM departments WHERE id = ?")
            .bind(department_id)
            .fetch_optional(&state.db)
            .await?;
        if exists.is_none() {
            return Err(ApiError::not_found("Department not found"));
        }
    }

    let password_hash = hash_password(&request.password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = format_ts(state.clock.now());

    sqlx::query(
        r#"
        INSERT INTO identities (id, name, email, password_hash, role, department_id, phone, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(request.name.trim())
    .bind(request.email.trim().to_lowercase())
    .bind(&password_hash)
    .bind(request.role)
    .bind(&department_id)
    .bind(normalize_phone(request.phone))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(email_taken)?;

    info!(identity_id = %id, role = %request.role, "Account created");
    let identity = load_identity(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(identity.into())))
}

/// GET /api/admin/employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<IdentityResponse>>, ApiError> {
    let identities = sqlx::query_as::<_, Identity>("SELECT * FROM identities ORDER BY name ASC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(identities.into_iter().map(Into::into).collect()))
}

/// PUT /api/admin/employees/:id/status
pub async fn set_employee_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateIdentityStatusRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    if id == actor.id && request.status == IdentityStatus::Inactive {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let result = sqlx::query("UPDATE identities SET status = ?, updated_at = ? WHERE id = ?")
        .bind(request.status)
        .bind(format_ts(state.clock.now()))
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Account not found"));
    }
    if request.status == IdentityStatus::Inactive {
        state.otp.invalidate_all(&id).await?;
        state.credentials.revoke_reset(&id).await?;
    }

    info!(identity_id = %id, status = ?request.status, "Account status changed");
    Ok(Json(load_identity(&state, &id).await?.into()))
}
