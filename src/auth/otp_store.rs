//! `OtpStore` implementations.
//!
//! `MemoryOtpStore` lives inside one process. `SqliteOtpStore` keeps challenges
//! in the shared database so any server instance can verify a code another
//! instance issued.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::FromRow;

use super::otp::{OtpChallenge, OtpKey, OtpStore};
use crate::db::DbPool;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    entries: DashMap<OtpKey, OtpChallenge>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, key: &OtpKey, challenge: OtpChallenge) -> Result<()> {
        self.entries.insert(key.clone(), challenge);
        Ok(())
    }

    async fn get(&self, key: &OtpKey) -> Result<Option<OtpChallenge>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn consume(&self, key: &OtpKey, challenge_id: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, c| c.challenge_id == challenge_id)
            .is_some())
    }

    async fn record_failure(&self, key: &OtpKey, challenge_id: &str) -> Result<Option<u32>> {
        Ok(self.entries.get_mut(key).and_then(|mut entry| {
            if entry.challenge_id != challenge_id {
                return None;
            }
            entry.attempts += 1;
            Some(entry.attempts)
        }))
    }

    async fn clear_subject(&self, subject: &str) -> Result<()> {
        self.entries.retain(|key, _| key.subject != subject);
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ChallengeRow {
    challenge_id: String,
    target: String,
    code_hash: String,
    attempts: i64,
    issued_at: i64,
    expires_at: i64,
}

impl From<ChallengeRow> for OtpChallenge {
    fn from(row: ChallengeRow) -> Self {
        Self {
            challenge_id: row.challenge_id,
            target: row.target,
            code_hash: row.code_hash,
            attempts: row.attempts.max(0) as u32,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct SqliteOtpStore {
    db: DbPool,
}

impl SqliteOtpStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for SqliteOtpStore {
    async fn put(&self, key: &OtpKey, challenge: OtpChallenge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (subject, purpose, challenge_id, target, code_hash, attempts, issued_at, expires_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(subject, purpose) DO UPDATE SET
                challenge_id = excluded.challenge_id,
                target = excluded.target,
                code_hash = excluded.code_hash,
                attempts = 0,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&key.subject)
        .bind(key.purpose.as_str())
        .bind(&challenge.challenge_id)
        .bind(&challenge.target)
        .bind(&challenge.code_hash)
        .bind(challenge.issued_at)
        .bind(challenge.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &OtpKey) -> Result<Option<OtpChallenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "SELECT challenge_id, target, code_hash, attempts, issued_at, expires_at
             FROM otp_challenges WHERE subject = ? AND purpose = ?",
        )
        .bind(&key.subject)
        .bind(key.purpose.as_str())
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(OtpChallenge::from))
    }

    async fn consume(&self, key: &OtpKey, challenge_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM otp_challenges WHERE subject = ? AND purpose = ? AND challenge_id = ?",
        )
        .bind(&key.subject)
        .bind(key.purpose.as_str())
        .bind(challenge_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_failure(&self, key: &OtpKey, challenge_id: &str) -> Result<Option<u32>> {
        let attempts: Option<(i64,)> = sqlx::query_as(
            "UPDATE otp_challenges SET attempts = attempts + 1
             WHERE subject = ? AND purpose = ? AND challenge_id = ?
             RETURNING attempts",
        )
        .bind(&key.subject)
        .bind(key.purpose.as_str())
        .bind(challenge_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(attempts.map(|(n,)| n.max(0) as u32))
    }

    async fn clear_subject(&self, subject: &str) -> Result<()> {
        sqlx::query("DELETE FROM otp_challenges WHERE subject = ?")
            .bind(subject)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OtpPurpose;
    use crate::db::testing::memory_pool;

    fn challenge(id: &str) -> OtpChallenge {
        OtpChallenge {
            challenge_id: id.to_string(),
            target: "alice@co.com".to_string(),
            code_hash: "deadbeef".to_string(),
            attempts: 0,
            issued_at: 1_000,
            expires_at: 301_000,
        }
    }

    /// Behaviour every store must share.
    async fn exercise(store: &dyn OtpStore) {
        let key = OtpKey::new("u1", OtpPurpose::PasswordReset);
        let other = OtpKey::new("u1", OtpPurpose::EmailChange);

        assert!(store.get(&key).await.unwrap().is_none());

        store.put(&key, challenge("c1")).await.unwrap();
        store.put(&other, challenge("c9")).await.unwrap();
        assert_eq!(store.record_failure(&key, "c1").await.unwrap(), Some(1));
        assert_eq!(store.record_failure(&key, "c1").await.unwrap(), Some(2));

        // Superseding resets attempts and invalidates the old id.
        store.put(&key, challenge("c2")).await.unwrap();
        let current = store.get(&key).await.unwrap().unwrap();
        assert_eq!(current.challenge_id, "c2");
        assert_eq!(current.attempts, 0);
        assert_eq!(store.record_failure(&key, "c1").await.unwrap(), None);
        assert!(!store.consume(&key, "c1").await.unwrap());

        assert!(store.consume(&key, "c2").await.unwrap());
        assert!(!store.consume(&key, "c2").await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());

        store.put(&key, challenge("c3")).await.unwrap();
        store.clear_subject("u1").await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.get(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryOtpStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let pool = memory_pool().await;
        exercise(&SqliteOtpStore::new(pool)).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_is_shared_between_handles() {
        let pool = memory_pool().await;
        let a = SqliteOtpStore::new(pool.clone());
        let b = SqliteOtpStore::new(pool);
        let key = OtpKey::new("u1", OtpPurpose::PasswordReset);

        a.put(&key, challenge("c1")).await.unwrap();
        assert_eq!(b.get(&key).await.unwrap().unwrap().target, "alice@co.com");
        assert!(b.consume(&key, "c1").await.unwrap());
        assert!(!a.consume(&key, "c1").await.unwrap());
    }
}
