use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use super::extract::ApiJson;
use super::validation::{validate_name, validate_uuid};
use crate::clock::format_ts;
use crate::db::{AssignManagerRequest, CreateDepartmentRequest, Department, Identity, Role};
use crate::AppState;

async fn load_department(state: &AppState, id: &str) -> Result<Department, ApiError> {
    sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Department not found"))
}

/// GET /api/departments
pub async fn list_departments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Department>>, ApiError> {
    let departments = sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY name ASC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(departments))
}

/// POST /api/admin/departments
pub async fn create_department(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<Department>), ApiError> {
    validate_name(&request.name, "Department name")
        .map_err(|e| ApiError::validation_field("name", e))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = format_ts(state.clock.now());

    sqlx::query(
        "INSERT INTO departments (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(request.name.trim())
    .bind(request.description.trim())
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    info!(department_id = %id, "Department created");
    Ok((StatusCode::CREATED, Json(load_department(&state, &id).await?)))
}

/// PUT /api/admin/departments/:id/manager
///
/// The slot is claimed with a conditional update, so two admins racing to
/// appoint different managers cannot both win.
pub async fn assign_manager(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AssignManagerRequest>,
) -> Result<Json<Department>, ApiError> {
    validate_uuid(&request.manager_id, "manager_id")
        .map_err(|e| ApiError::validation_field("manager_id", e))?;
    load_department(&state, &id).await?;

    let manager = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = ?")
        .bind(&request.manager_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Manager not found"))?;
    if manager.role != Role::Manager {
        return Err(ApiError::validation_field(
            "manager_id",
            "Only identities with the Manager role can lead a department",
        ));
    }

    let now = format_ts(state.clock.now());
    let mut tx = state.db.begin().await?;

    let claimed = sqlx::query(
        "UPDATE departments SET manager_id = ?, updated_at = ?
         WHERE id = ? AND (manager_id IS NULL OR manager_id = ?)",
    )
    .bind(&manager.id)
    .bind(&now)
    .bind(&id)
    .bind(&manager.id)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(ApiError::conflict("Department already has a manager"));
    }

    sqlx::query("UPDATE identities SET department_id = ?, updated_at = ? WHERE id = ?")
        .bind(&id)
        .bind(&now)
        .bind(&manager.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(department_id = %id, manager_id = %manager.id, "Department manager assigned");
    Ok(Json(load_department(&state, &id).await?))
}
