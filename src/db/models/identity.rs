//! Identity (account) models and the closed role set.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account role. Everything other than Admin and Manager is an employee job title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Role {
    Admin,
    Manager,
    #[serde(rename = "Sales Executive")]
    #[sqlx(rename = "Sales Executive")]
    SalesExecutive,
    #[serde(rename = "Inventory Manager")]
    #[sqlx(rename = "Inventory Manager")]
    InventoryManager,
    #[serde(rename = "Web Developer")]
    #[sqlx(rename = "Web Developer")]
    WebDeveloper,
    #[serde(rename = "Software Developer")]
    #[sqlx(rename = "Software Developer")]
    SoftwareDeveloper,
    #[serde(rename = "HR")]
    #[sqlx(rename = "HR")]
    Hr,
    Accountant,
    Designer,
    Technician,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::Admin,
        Role::Manager,
        Role::SalesExecutive,
        Role::InventoryManager,
        Role::WebDeveloper,
        Role::SoftwareDeveloper,
        Role::Hr,
        Role::Accountant,
        Role::Designer,
        Role::Technician,
    ];

    /// Job titles that perform assigned work.
    pub const EMPLOYEE_TITLES: [Role; 8] = [
        Role::SalesExecutive,
        Role::InventoryManager,
        Role::WebDeveloper,
        Role::SoftwareDeveloper,
        Role::Hr,
        Role::Accountant,
        Role::Designer,
        Role::Technician,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::SalesExecutive => "Sales Executive",
            Role::InventoryManager => "Inventory Manager",
            Role::WebDeveloper => "Web Developer",
            Role::SoftwareDeveloper => "Software Developer",
            Role::Hr => "HR",
            Role::Accountant => "Accountant",
            Role::Designer => "Designer",
            Role::Technician => "Technician",
        }
    }

    pub fn is_employee(&self) -> bool {
        !matches!(self, Role::Admin | Role::Manager)
    }

    /// Every role except Admin belongs to a department.
    pub fn requires_department(&self) -> bool {
        !matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum IdentityStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub status: IdentityStatus,
    pub phone: Option<String>,
    /// Set after a password-reset OTP is verified; consumed by the password change
    pub reset_verified_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}

/// Public view of an identity. Never carries the password hash or reset state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub status: IdentityStatus,
    pub phone: Option<String>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            role: identity.role,
            department_id: identity.department_id,
            status: identity.status,
            phone: identity.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: IdentityResponse,
}

#[derive(Debug, Deserialize)]
pub struct CreateIdentityRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIdentityStatusRequest {
    pub status: IdentityStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    /// New password; empty or absent leaves the credential untouched
    pub password: Option<String>,
}
