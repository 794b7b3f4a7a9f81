//! Task workflow: assignment, progress, attachments, submission and decisions.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::gate::{self, TaskMutation};
use super::repository::{NewTask, TaskFilter, TaskRepository};
use crate::auth::rbac::{authorize, Actor, Operation};
use crate::clock::{format_ts, Clock};
use crate::db::{
    ApprovalStatus, Comment, CreateTaskRequest, Decision, Task, TaskListQuery, TaskStatus, Upload,
};
use crate::error::{Error, Result};

/// A file already placed in storage, waiting to be attached to a task.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub name: String,
    pub url: String,
    pub comment: String,
}

pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Reference date for the overdue flag.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    fn now(&self) -> String {
        format_ts(self.clock.now())
    }

    async fn load(&self, id: &str) -> Result<Task> {
        self.repo.find(id).await?.ok_or(Error::NotFound("task"))
    }

    /// Explain a guarded write that matched no row.
    async fn rejected_write(&self, id: &str, mutation: TaskMutation) -> Error {
        let task = match self.repo.find(id).await {
            Ok(Some(task)) => task,
            Ok(None) => return Error::NotFound("task"),
            Err(e) => return e,
        };
        match (mutation, task.approval.status) {
            (TaskMutation::Decide, ApprovalStatus::Approved) => Error::AlreadyProcessed,
            (_, ApprovalStatus::Approved) => Error::ApprovalLocked,
            _ => Error::conflict("Task changed while the request was in flight, retry"),
        }
    }

    pub async fn assign(&self, actor: &Actor, request: CreateTaskRequest) -> Result<Task> {
        authorize(actor, Operation::AssignTask)?;

        let title = request.title.trim();
        if title.is_empty() {
            return Err(Error::validation("Title is required"));
        }
        if let Some(own) = &actor.department {
            if own != &request.department_id {
                return Err(Error::forbidden(
                    "Managers can only assign tasks within their own department",
                ));
            }
        }
        if !self.repo.department_exists(&request.department_id).await? {
            return Err(Error::NotFound("department"));
        }

        let employee = self
            .repo
            .find_identity(&request.employee_id)
            .await?
            .ok_or(Error::NotFound("employee"))?;
        if !employee.role.is_employee() {
            return Err(Error::validation("Tasks can only be assigned to employees"));
        }
        if !employee.is_active() {
            return Err(Error::validation("Employee account is inactive"));
        }
        if employee.department_id.as_deref() != Some(request.department_id.as_str()) {
            return Err(Error::validation(
                "Employee does not belong to this department",
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.repo
            .insert(NewTask {
                id: id.clone(),
                title: title.to_string(),
                description: request.description.trim().to_string(),
                employee_id: employee.id,
                department_id: request.department_id,
                created_by: actor.id.clone(),
                priority: request.priority,
                due_date: request.due_date.format("%Y-%m-%d").to_string(),
                created_at: self.now(),
            })
            .await?;

        info!(task = %id, manager = %actor.id, "Task assigned");
        self.load(&id).await
    }

    pub async fn get(&self, actor: &Actor, id: &str) -> Result<Task> {
        let task = self.load(id).await?;
        gate::allow_view(actor, &task)?;
        Ok(task)
    }

    pub async fn list(&self, actor: &Actor, query: &TaskListQuery) -> Result<Vec<Task>> {
        authorize(actor, Operation::ListTasks)?;
        self.repo
            .list(&TaskFilter {
                employee_id: None,
                department_id: query.department_id.clone(),
                status: query.status,
            })
            .await
    }

    pub async fn list_assigned(&self, actor: &Actor) -> Result<Vec<Task>> {
        authorize(actor, Operation::ViewOwnTasks)?;
        self.repo
            .list(&TaskFilter {
                employee_id: Some(actor.id.clone()),
                ..Default::default()
            })
            .await
    }

    /// Completed work awaiting or carrying a manager decision.
    pub async fn approval_queue(&self, actor: &Actor) -> Result<Vec<Task>> {
        authorize(actor, Operation::ViewApprovalQueue)?;
        self.repo
            .list(&TaskFilter {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            })
            .await
    }

    /// Run the mutation gate without writing. Lets callers refuse a request
    /// before doing expensive work such as storing files.
    pub async fn check(&self, actor: &Actor, id: &str, mutation: TaskMutation) -> Result<Task> {
        let task = self.load(id).await?;
        gate::allow(actor, &task, mutation)?;
        Ok(task)
    }

    /// Every move to `Completed` stamps `completed_at`; leaving `Completed`
    /// keeps the last stamp.
    pub async fn set_status(&self, actor: &Actor, id: &str, status: TaskStatus) -> Result<Task> {
        self.check(actor, id, TaskMutation::UpdateStatus).await?;

        let now = self.now();
        let stamp = (status == TaskStatus::Completed).then_some(now.as_str());
        if !self.repo.set_status(id, status, stamp, &now).await? {
            return Err(self.rejected_write(id, TaskMutation::UpdateStatus).await);
        }

        info!(task = %id, status = %status, "Task status updated");
        self.load(id).await
    }

    pub async fn add_comment(&self, actor: &Actor, id: &str, text: &str) -> Result<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("Comment text is required"));
        }
        self.check(actor, id, TaskMutation::AddComment).await?;

        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            author_id: actor.id.clone(),
            created_at: self.now(),
        };
        if !self.repo.append_comment(id, &comment).await? {
            return Err(self.rejected_write(id, TaskMutation::AddComment).await);
        }

        info!(task = %id, author = %actor.id, "Comment added");
        Ok(comment)
    }

    fn uploads_from(&self, files: Vec<NewUpload>) -> Vec<Upload> {
        let now = self.now();
        files
            .into_iter()
            .map(|file| Upload {
                id: uuid::Uuid::new_v4().to_string(),
                name: file.name,
                url: file.url,
                comment: file.comment,
                created_at: now.clone(),
            })
            .collect()
    }

    pub async fn add_uploads(
        &self,
        actor: &Actor,
        id: &str,
        files: Vec<NewUpload>,
    ) -> Result<Task> {
        if files.is_empty() {
            return Err(Error::validation("No files provided"));
        }
        self.check(actor, id, TaskMutation::AddUploads).await?;

        let uploads = self.uploads_from(files);
        if !self.repo.append_uploads(id, &uploads, &self.now()).await? {
            return Err(self.rejected_write(id, TaskMutation::AddUploads).await);
        }

        info!(task = %id, count = uploads.len(), "Files uploaded");
        self.load(id).await
    }

    /// Detach an upload. Returns the updated task and the removed record, so
    /// the caller can release the stored bytes.
    pub async fn remove_upload(
        &self,
        actor: &Actor,
        id: &str,
        upload_id: &str,
    ) -> Result<(Task, Upload)> {
        let task = self.check(actor, id, TaskMutation::RemoveUpload).await?;
        let removed = task
            .uploads
            .into_iter()
            .find(|u| u.id == upload_id)
            .ok_or(Error::NotFound("upload"))?;

        if !self.repo.remove_upload(id, upload_id, &self.now()).await? {
            return Err(self.rejected_write(id, TaskMutation::RemoveUpload).await);
        }

        info!(task = %id, upload = %upload_id, "Upload removed");
        Ok((self.load(id).await?, removed))
    }

    /// Complete the task and put it in front of a manager. Files sent along
    /// replace the current attachments.
    pub async fn submit(&self, actor: &Actor, id: &str, files: Vec<NewUpload>) -> Result<Task> {
        self.check(actor, id, TaskMutation::Submit).await?;

        let uploads = self.uploads_from(files);
        if !self.repo.submit(id, &uploads, &self.now()).await? {
            return Err(self.rejected_write(id, TaskMutation::Submit).await);
        }

        info!(task = %id, employee = %actor.id, "Task submitted for approval");
        self.load(id).await
    }

    pub async fn decide(
        &self,
        actor: &Actor,
        id: &str,
        decision: Decision,
        remark: Option<&str>,
    ) -> Result<Task> {
        let task = self.check(actor, id, TaskMutation::Decide).await?;

        let remark = remark.map(str::trim).unwrap_or_default();
        if !self
            .repo
            .decide(id, task.approval.status, decision, &actor.id, remark, &self.now())
            .await?
        {
            return Err(self.rejected_write(id, TaskMutation::Decide).await);
        }

        info!(task = %id, manager = %actor.id, decision = ?decision, "Approval decided");
        self.load(id).await
    }
}
