mod models;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(db_url: &str) -> Result<DbPool> {
    info!("Initializing database at {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("Failed to connect to database: {}", db_url))?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: departments, identities, tasks, OTP challenges
    execute_sql(pool, include_str!("../../migrations/001_initial.sql"))
        .await
        .context("Migration 001_initial failed")?;

    info!("Migrations completed");
    Ok(())
}

/// Fixtures for tests that need a real schema.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::format_ts;
    use chrono::Utc;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    /// Single-connection in-memory database with migrations applied.
    pub async fn memory_pool() -> DbPool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub async fn insert_department(pool: &DbPool, name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO departments (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    /// Insert an identity whose password hash is an opaque placeholder.
    pub async fn insert_identity(
        pool: &DbPool,
        email: &str,
        role: Role,
        department_id: Option<&str>,
    ) -> String {
        insert_identity_with_hash(pool, email, role, department_id, "not-a-real-hash").await
    }

    pub async fn insert_identity_with_hash(
        pool: &DbPool,
        email: &str,
        role: Role,
        department_id: Option<&str>,
        password_hash: &str,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO identities (id, name, email, password_hash, role, department_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email.split('@').next().unwrap_or(email))
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(department_id)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    pub async fn insert_task(
        pool: &DbPool,
        employee_id: &str,
        department_id: &str,
        created_by: &str,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_ts(Utc::now());
        sqlx::query(
            "INSERT INTO tasks (id, title, employee_id, department_id, created_by, due_date, created_at, updated_at)
             VALUES (?, 'Quarterly stock audit', ?, ?, ?, '2030-01-31', ?, ?)",
        )
        .bind(&id)
        .bind(employee_id)
        .bind(department_id)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    /// Department with one manager and two employees.
    pub struct Org {
        pub department_id: String,
        pub admin_id: String,
        pub manager_id: String,
        pub employee_id: String,
        pub other_employee_id: String,
    }

    pub async fn seed_org(pool: &DbPool) -> Org {
        let department_id = insert_department(pool, "Operations").await;
        let admin_id = insert_identity(pool, "root@co.com", Role::Admin, None).await;
        let manager_id =
            insert_identity(pool, "maria@co.com", Role::Manager, Some(&department_id)).await;
        let employee_id =
            insert_identity(pool, "alice@co.com", Role::WebDeveloper, Some(&department_id)).await;
        let other_employee_id =
            insert_identity(pool, "bob@co.com", Role::Designer, Some(&department_id)).await;
        Org {
            department_id,
            admin_id,
            manager_id,
            employee_id,
            other_employee_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "departments",
                "identities",
                "otp_challenges",
                "task_comments",
                "task_uploads",
                "tasks"
            ]
        );
    }

    #[tokio::test]
    async fn test_email_is_unique_ignoring_case() {
        let pool = memory_pool().await;
        insert_identity(&pool, "root@co.com", Role::Admin, None).await;
        let dup = sqlx::query(
            "INSERT INTO identities (id, name, email, password_hash, role) VALUES ('x', 'x', 'ROOT@co.com', 'h', 'Admin')",
        )
        .execute(&pool)
        .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_identity_row_decodes_typed_enums() {
        let pool = memory_pool().await;
        let org = seed_org(&pool).await;
        let identity: Identity = sqlx::query_as("SELECT * FROM identities WHERE id = ?")
            .bind(&org.employee_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(identity.role, Role::WebDeveloper);
        assert_eq!(identity.status, IdentityStatus::Active);
        assert!(identity.is_active());
    }
}
