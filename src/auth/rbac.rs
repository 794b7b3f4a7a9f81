//! Role allow-list.
//!
//! Every protected operation is named here together with the roles that may
//! invoke it. Handlers never compare role strings themselves; they go through
//! [`authorize`] (directly, or via the router's per-route gate).

use crate::db::Role;
use crate::error::{Error, Result};

/// The authenticated caller, as established by a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub department: Option<String>,
}

impl Actor {
    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewDepartments,
    ManageDepartments,
    ManageAccounts,
    ManageOwnProfile,
    AssignTask,
    ListTasks,
    ViewTask,
    ViewOwnTasks,
    ViewApprovalQueue,
    UpdateTaskStatus,
    AddComment,
    UploadFiles,
    RemoveUpload,
    SubmitTask,
    DecideApproval,
}

const EVERYONE: &[Role] = &Role::ALL;
const ADMIN: &[Role] = &[Role::Admin];
const MANAGER: &[Role] = &[Role::Manager];
const MANAGER_OR_ADMIN: &[Role] = &[Role::Manager, Role::Admin];
const EMPLOYEES: &[Role] = &Role::EMPLOYEE_TITLES;
const EMPLOYEES_OR_MANAGER: &[Role] = &[
    Role::SalesExecutive,
    Role::InventoryManager,
    Role::WebDeveloper,
    Role::SoftwareDeveloper,
    Role::Hr,
    Role::Accountant,
    Role::Designer,
    Role::Technician,
    Role::Manager,
];

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::ViewDepartments | Operation::ViewTask => EVERYONE,
            Operation::ManageDepartments
            | Operation::ManageAccounts
            | Operation::ManageOwnProfile => ADMIN,
            Operation::AssignTask | Operation::ViewApprovalQueue | Operation::DecideApproval => {
                MANAGER
            }
            Operation::ListTasks => MANAGER_OR_ADMIN,
            Operation::ViewOwnTasks
            | Operation::UpdateTaskStatus
            | Operation::UploadFiles
            | Operation::RemoveUpload
            | Operation::SubmitTask => EMPLOYEES,
            Operation::AddComment => EMPLOYEES_OR_MANAGER,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Operation::ViewDepartments => "view departments",
            Operation::ManageDepartments => "manage departments",
            Operation::ManageAccounts => "manage accounts",
            Operation::ManageOwnProfile => "manage the admin profile",
            Operation::AssignTask => "assign tasks",
            Operation::ListTasks => "list tasks",
            Operation::ViewTask => "view tasks",
            Operation::ViewOwnTasks => "view assigned tasks",
            Operation::ViewApprovalQueue => "view the approval queue",
            Operation::UpdateTaskStatus => "update task status",
            Operation::AddComment => "comment on tasks",
            Operation::UploadFiles => "upload task files",
            Operation::RemoveUpload => "remove task files",
            Operation::SubmitTask => "submit tasks for approval",
            Operation::DecideApproval => "approve or reject tasks",
        }
    }
}

/// Check the caller's role against the allow-list for `operation`.
pub fn authorize(actor: &Actor, operation: Operation) -> Result<()> {
    if operation.permits(actor.role) {
        Ok(())
    } else {
        tracing::debug!(
            actor = %actor.id,
            role = %actor.role,
            ?operation,
            "Role not permitted"
        );
        Err(Error::forbidden(format!(
            "{} is not allowed to {}",
            actor.role,
            operation.describe()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor {
            id: "a".to_string(),
            role,
            department: None,
        }
    }

    #[test]
    fn test_admin_cannot_touch_task_work() {
        for op in [
            Operation::UpdateTaskStatus,
            Operation::AddComment,
            Operation::UploadFiles,
            Operation::SubmitTask,
            Operation::DecideApproval,
            Operation::AssignTask,
        ] {
            assert!(
                matches!(authorize(&actor(Role::Admin), op), Err(Error::Forbidden(_))),
                "{:?}",
                op
            );
        }
        assert!(authorize(&actor(Role::Admin), Operation::ListTasks).is_ok());
        assert!(authorize(&actor(Role::Admin), Operation::ManageAccounts).is_ok());
    }

    #[test]
    fn test_manager_decides_but_does_not_perform_work() {
        let manager = actor(Role::Manager);
        assert!(authorize(&manager, Operation::DecideApproval).is_ok());
        assert!(authorize(&manager, Operation::AssignTask).is_ok());
        assert!(authorize(&manager, Operation::AddComment).is_ok());
        assert!(authorize(&manager, Operation::SubmitTask).is_err());
        assert!(authorize(&manager, Operation::UpdateTaskStatus).is_err());
        assert!(authorize(&manager, Operation::ManageAccounts).is_err());
    }

    #[test]
    fn test_every_title_performs_work_but_never_decides() {
        for role in Role::EMPLOYEE_TITLES {
            let employee = actor(role);
            assert!(authorize(&employee, Operation::SubmitTask).is_ok());
            assert!(authorize(&employee, Operation::UploadFiles).is_ok());
            assert!(authorize(&employee, Operation::ViewOwnTasks).is_ok());
            assert!(authorize(&employee, Operation::DecideApproval).is_err());
            assert!(authorize(&employee, Operation::ViewApprovalQueue).is_err());
            assert!(authorize(&employee, Operation::ListTasks).is_err());
        }
    }

    #[test]
    fn test_everyone_views_departments() {
        for role in Role::ALL {
            assert!(Operation::ViewDepartments.permits(role));
        }
    }

    #[test]
    fn test_forbidden_message_names_role_and_operation() {
        let err = authorize(&actor(Role::Designer), Operation::DecideApproval).unwrap_err();
        assert_eq!(err.to_string(), "Designer is not allowed to approve or reject tasks");
    }
}
