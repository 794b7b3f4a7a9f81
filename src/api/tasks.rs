//! Task endpoints. The rules live in `TaskService`; handlers parse input,
//! move file bytes into storage and shape responses.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::warn;

use super::error::{ApiError, ErrorCode};
use super::extract::ApiJson;
use crate::auth::Actor;
use crate::db::{
    AddCommentRequest, Comment, CreateTaskRequest, DecideRequest, Task, TaskListQuery,
    TaskResponse, UpdateStatusRequest,
};
use crate::tasks::{NewUpload, TaskMutation};
use crate::AppState;

fn respond(state: &AppState, task: Task) -> Json<TaskResponse> {
    Json(TaskResponse::new(task, state.tasks.today()))
}

fn respond_all(state: &AppState, tasks: Vec<Task>) -> Json<Vec<TaskResponse>> {
    let today = state.tasks.today();
    Json(
        tasks
            .into_iter()
            .map(|task| TaskResponse::new(task, today))
            .collect(),
    )
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(request): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let task = state.tasks.assign(&actor, request).await?;
    Ok((StatusCode::CREATED, respond(&state, task)))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.tasks.list(&actor, &query).await?;
    Ok(respond_all(&state, tasks))
}

/// GET /api/tasks/mine
pub async fn my_tasks(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.tasks.list_assigned(&actor).await?;
    Ok(respond_all(&state, tasks))
}

/// GET /api/tasks/approvals
pub async fn approval_queue(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.tasks.approval_queue(&actor).await?;
    Ok(respond_all(&state, tasks))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.tasks.get(&actor, &id).await?;
    Ok(respond(&state, task))
}

/// PUT /api/tasks/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.tasks.set_status(&actor, &id, request.status).await?;
    Ok(respond(&state, task))
}

/// POST /api/tasks/:id/comment
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AddCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.tasks.add_comment(&actor, &id, &request.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /api/tasks/:id/upload
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<TaskResponse>, ApiError> {
    let form = read_form(&state, multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::validation_field("files", "No files provided"));
    }

    state.tasks.check(&actor, &id, TaskMutation::AddUploads).await?;
    let uploads = store_files(&state, form).await?;
    let urls: Vec<String> = uploads.iter().map(|u| u.url.clone()).collect();

    match state.tasks.add_uploads(&actor, &id, uploads).await {
        Ok(task) => Ok(respond(&state, task)),
        Err(e) => {
            discard_files(&state, &urls).await;
            Err(e.into())
        }
    }
}

/// DELETE /api/tasks/:id/upload/:upload_id
pub async fn remove_upload(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, upload_id)): Path<(String, String)>,
) -> Result<Json<TaskResponse>, ApiError> {
    let (task, removed) = state.tasks.remove_upload(&actor, &id, &upload_id).await?;
    discard_files(&state, &[removed.url]).await;
    Ok(respond(&state, task))
}

/// POST /api/tasks/submit/:id
///
/// The body is optional; files sent along replace the current attachments.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    multipart: Option<Multipart>,
) -> Result<Json<TaskResponse>, ApiError> {
    let form = match multipart {
        Some(multipart) => read_form(&state, multipart).await?,
        None => UploadForm::default(),
    };

    let before = state.tasks.check(&actor, &id, TaskMutation::Submit).await?;
    let uploads = store_files(&state, form).await?;
    let urls: Vec<String> = uploads.iter().map(|u| u.url.clone()).collect();

    let task = match state.tasks.submit(&actor, &id, uploads).await {
        Ok(task) => task,
        Err(e) => {
            discard_files(&state, &urls).await;
            return Err(e.into());
        }
    };
    if !urls.is_empty() {
        let replaced: Vec<String> = before.uploads.into_iter().map(|u| u.url).collect();
        discard_files(&state, &replaced).await;
    }
    Ok(respond(&state, task))
}

/// PUT /api/tasks/approve/:id
pub async fn decide(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<DecideRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state
        .tasks
        .decide(&actor, &id, request.status, request.remark.as_deref())
        .await?;
    Ok(respond(&state, task))
}

/// Files and the shared comment pulled from a multipart body.
#[derive(Debug, Default)]
struct UploadForm {
    files: Vec<(String, Bytes)>,
    comment: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(ErrorCode::PayloadTooLarge, "Request body is too large")
    } else {
        ApiError::bad_request(err.body_text())
    }
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let limits = &state.config.storage;
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("comment") {
            form.comment = field.text().await.map_err(multipart_error)?.trim().to_string();
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if form.files.len() >= limits.max_files_per_request {
            return Err(ApiError::validation_field(
                "files",
                format!("At most {} files per request", limits.max_files_per_request),
            ));
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > limits.max_file_bytes {
                return Err(ApiError::validation_field(
                    "files",
                    format!(
                        "{} exceeds the {} byte limit",
                        file_name, limits.max_file_bytes
                    ),
                ));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(ApiError::validation_field(
                "files",
                format!("{} is empty", file_name),
            ));
        }

        form.files.push((file_name, data.freeze()));
    }

    Ok(form)
}

async fn store_files(state: &AppState, form: UploadForm) -> Result<Vec<NewUpload>, ApiError> {
    let mut uploads: Vec<NewUpload> = Vec::with_capacity(form.files.len());
    for (file_name, data) in form.files {
        let stored = match state.files.put(&file_name, data).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(file = %file_name, "Failed to store upload");
                let urls: Vec<String> = uploads.into_iter().map(|u| u.url).collect();
                discard_files(state, &urls).await;
                return Err(e.into());
            }
        };
        uploads.push(NewUpload {
            name: stored.name,
            url: stored.url,
            comment: form.comment.clone(),
        });
    }
    Ok(uploads)
}

/// Best-effort removal of stored bytes no task row points at.
async fn discard_files(state: &AppState, urls: &[String]) {
    for url in urls {
        if let Err(e) = state.files.delete(url).await {
            warn!(url = %url, error = %e, "Failed to remove stored upload");
        }
    }
}
