//! Task persistence.
//!
//! Every write that must respect the approval lock carries the lock in its
//! `WHERE` clause, so the check and the write are one atomic statement. A
//! write that matched nothing returns `false`; the caller re-reads the task to
//! find out why.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::{
    ApprovalStatus, Comment, DbPool, Decision, Identity, Priority, Task, TaskRecord, TaskStatus,
    Upload,
};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub employee_id: String,
    pub department_id: String,
    pub created_by: String,
    pub priority: Priority,
    pub due_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub employee_id: Option<String>,
    pub department_id: Option<String>,
    pub status: Option<TaskStatus>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: NewTask) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<Task>>;

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    async fn find_identity(&self, id: &str) -> Result<Option<Identity>>;

    async fn department_exists(&self, id: &str) -> Result<bool>;

    /// Set progress status unless approved. `completed_at` is written only when
    /// given; otherwise the previous value is kept.
    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        completed_at: Option<&str>,
        now: &str,
    ) -> Result<bool>;

    async fn append_comment(&self, task_id: &str, comment: &Comment) -> Result<bool>;

    async fn append_uploads(&self, task_id: &str, uploads: &[Upload], now: &str) -> Result<bool>;

    async fn remove_upload(&self, task_id: &str, upload_id: &str, now: &str) -> Result<bool>;

    /// Mark the task completed and (re)open its approval. Non-empty `uploads`
    /// replace the existing attachments.
    async fn submit(&self, task_id: &str, uploads: &[Upload], now: &str) -> Result<bool>;

    /// Record a decision, only while the approval is still in the `expected`
    /// state the caller based it on.
    async fn decide(
        &self,
        task_id: &str,
        expected: ApprovalStatus,
        decision: Decision,
        manager_id: &str,
        remark: &str,
        now: &str,
    ) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteTaskRepository {
    db: DbPool,
}

impl SqliteTaskRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn hydrate(&self, record: TaskRecord) -> Result<Task> {
        let uploads = sqlx::query_as::<_, Upload>(
            "SELECT id, name, url, comment, created_at FROM task_uploads WHERE task_id = ? ORDER BY created_at, rowid",
        )
        .bind(&record.id)
        .fetch_all(&self.db)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, text, author_id, created_at FROM task_comments WHERE task_id = ? ORDER BY created_at, rowid",
        )
        .bind(&record.id)
        .fetch_all(&self.db)
        .await?;

        Task::from_parts(record, uploads, comments)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: NewTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, description, employee_id, department_id, created_by, priority, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.employee_id)
        .bind(&task.department_id)
        .bind(&task.created_by)
        .bind(task.priority)
        .bind(&task.due_date)
        .bind(&task.created_at)
        .bind(&task.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Task>> {
        let record = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");
        if let Some(employee_id) = &filter.employee_id {
            query.push(" AND employee_id = ").push_bind(employee_id);
        }
        if let Some(department_id) = &filter.department_id {
            query.push(" AND department_id = ").push_bind(department_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY created_at DESC, rowid DESC");

        let records = query
            .build_query_as::<TaskRecord>()
            .fetch_all(&self.db)
            .await?;

        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            tasks.push(self.hydrate(record).await?);
        }
        Ok(tasks)
    }

    async fn find_identity(&self, id: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(identity)
    }

    async fn department_exists(&self, id: &str) -> Result<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM departments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn set_status(
        &self,
        id: &str,
        status: TaskStatus,
        completed_at: Option<&str>,
        now: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, completed_at = COALESCE(?, completed_at), updated_at = ?
            WHERE id = ? AND approval_status != ?
            "#,
        )
        .bind(status)
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .bind(ApprovalStatus::Approved)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_comment(&self, task_id: &str, comment: &Comment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_comments (id, task_id, text, author_id, created_at)
            SELECT ?, id, ?, ?, ? FROM tasks WHERE id = ? AND approval_status != ?
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.text)
        .bind(&comment.author_id)
        .bind(&comment.created_at)
        .bind(task_id)
        .bind(ApprovalStatus::Approved)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_uploads(&self, task_id: &str, uploads: &[Upload], now: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let touched = sqlx::query(
            "UPDATE tasks SET updated_at = ? WHERE id = ? AND approval_status != ?",
        )
        .bind(now)
        .bind(task_id)
        .bind(ApprovalStatus::Approved)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Ok(false);
        }

        for upload in uploads {
            insert_upload(&mut tx, task_id, upload).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn remove_upload(&self, task_id: &str, upload_id: &str, now: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM task_uploads
            WHERE id = ? AND task_id = ?
              AND EXISTS (SELECT 1 FROM tasks WHERE id = ? AND approval_status != ?)
            "#,
        )
        .bind(upload_id)
        .bind(task_id)
        .bind(task_id)
        .bind(ApprovalStatus::Approved)
        .execute(&mut *tx)
        .await?;
        if removed.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn submit(&self, task_id: &str, uploads: &[Upload], now: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let submitted = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?,
                completed_at = ?,
                approval_status = ?,
                approval_manager_id = NULL,
                approval_remark = '',
                approval_sent_at = ?,
                approval_decided_at = NULL,
                updated_at = ?
            WHERE id = ? AND approval_status != ?
            "#,
        )
        .bind(TaskStatus::Completed)
        .bind(now)
        .bind(ApprovalStatus::Pending)
        .bind(now)
        .bind(now)
        .bind(task_id)
        .bind(ApprovalStatus::Approved)
        .execute(&mut *tx)
        .await?;
        if submitted.rows_affected() == 0 {
            return Ok(false);
        }

        if !uploads.is_empty() {
            sqlx::query("DELETE FROM task_uploads WHERE task_id = ?")
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
            for upload in uploads {
                insert_upload(&mut tx, task_id, upload).await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn decide(
        &self,
        task_id: &str,
        expected: ApprovalStatus,
        decision: Decision,
        manager_id: &str,
        remark: &str,
        now: &str,
    ) -> Result<bool> {
        if expected.is_locked() {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET approval_status = ?,
                approval_manager_id = ?,
                approval_remark = ?,
                approval_decided_at = ?,
                updated_at = ?
            WHERE id = ? AND approval_status = ?
            "#,
        )
        .bind(ApprovalStatus::from(decision))
        .bind(manager_id)
        .bind(remark)
        .bind(now)
        .bind(now)
        .bind(task_id)
        .bind(expected)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

async fn insert_upload(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    task_id: &str,
    upload: &Upload,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO task_uploads (id, task_id, name, url, comment, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&upload.id)
    .bind(task_id)
    .bind(&upload.name)
    .bind(&upload.url)
    .bind(&upload.comment)
    .bind(&upload.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
