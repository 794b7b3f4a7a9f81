//! The single check every task mutation passes through.
//!
//! Order matters: role first, then ownership, then approval state. A caller
//! who fails the role or ownership check gets `Forbidden` regardless of the
//! task's approval state.

use crate::auth::rbac::{authorize, Actor, Operation};
use crate::db::Task;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMutation {
    UpdateStatus,
    AddComment,
    AddUploads,
    RemoveUpload,
    Submit,
    Decide,
}

impl TaskMutation {
    pub fn operation(&self) -> Operation {
        match self {
            TaskMutation::UpdateStatus => Operation::UpdateTaskStatus,
            TaskMutation::AddComment => Operation::AddComment,
            TaskMutation::AddUploads => Operation::UploadFiles,
            TaskMutation::RemoveUpload => Operation::RemoveUpload,
            TaskMutation::Submit => Operation::SubmitTask,
            TaskMutation::Decide => Operation::DecideApproval,
        }
    }
}

pub fn allow(actor: &Actor, task: &Task, mutation: TaskMutation) -> Result<()> {
    authorize(actor, mutation.operation())?;

    let owns = match mutation {
        TaskMutation::Decide => actor.is_manager(),
        TaskMutation::AddComment => actor.is_manager() || task.employee_id == actor.id,
        _ => task.employee_id == actor.id,
    };
    if !owns {
        return Err(Error::forbidden("Task is not assigned to you"));
    }

    match mutation {
        _ if !task.approval.status.is_locked() => Ok(()),
        TaskMutation::Decide => Err(Error::AlreadyProcessed),
        _ => Err(Error::ApprovalLocked),
    }
}

/// Read access: managers and admins see every task, employees only their own.
pub fn allow_view(actor: &Actor, task: &Task) -> Result<()> {
    authorize(actor, Operation::ViewTask)?;
    if actor.role.is_employee() && task.employee_id != actor.id {
        return Err(Error::forbidden("Task is not assigned to you"));
    }
    Ok(())
}
