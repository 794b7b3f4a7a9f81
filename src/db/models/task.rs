//! Task models: progress status, the embedded approval record, uploads and comments.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Error;

/// Progress of the assigned work. Any status may follow any other; only the
/// approval lock stops changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

/// Manager review state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Approved is terminal and freezes the task.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Outcome a manager may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ApprovalStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// Flat task row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub employee_id: String,
    pub department_id: String,
    pub created_by: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: String,
    pub completed_at: Option<String>,
    pub approval_status: ApprovalStatus,
    pub approval_manager_id: Option<String>,
    pub approval_remark: String,
    pub approval_sent_at: Option<String>,
    pub approval_decided_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: String,
    pub name: String,
    pub url: String,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub status: ApprovalStatus,
    pub manager_id: Option<String>,
    pub remark: String,
    pub sent_at: Option<String>,
    pub decided_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub employee_id: String,
    pub department_id: String,
    pub created_by: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub completed_at: Option<String>,
    pub uploads: Vec<Upload>,
    pub comments: Vec<Comment>,
    pub approval: Approval,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn from_parts(
        record: TaskRecord,
        uploads: Vec<Upload>,
        comments: Vec<Comment>,
    ) -> Result<Self, Error> {
        let due_date = NaiveDate::parse_from_str(&record.due_date, "%Y-%m-%d").map_err(|e| {
            Error::internal(format!("task {} has malformed due date: {}", record.id, e))
        })?;

        Ok(Self {
            id: record.id,
            title: record.title,
            description: record.description,
            employee_id: record.employee_id,
            department_id: record.department_id,
            created_by: record.created_by,
            priority: record.priority,
            status: record.status,
            due_date,
            completed_at: record.completed_at,
            uploads,
            comments,
            approval: Approval {
                status: record.approval_status,
                manager_id: record.approval_manager_id,
                remark: record.approval_remark,
                sent_at: record.approval_sent_at,
                decided_at: record.approval_decided_at,
            },
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Derived at read time; overdue is never stored.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.due_date < today
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub overdue: bool,
}

impl TaskResponse {
    pub fn new(task: Task, today: NaiveDate) -> Self {
        let overdue = task.is_overdue(today);
        Self { task, overdue }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub employee_id: String,
    pub department_id: String,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub status: Decision,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub department_id: Option<String>,
}
