//! Password credentials: lookup, verification and replacement.
//!
//! Replacing a password needs one of two proofs. Either the identity verified
//! a password-reset passcode moments ago (a short-lived grant recorded on the
//! identity row), or the caller is that identity acting with its own session.
//! Every successful replacement burns the grant and any outstanding passcodes.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::otp::OtpStore;
use super::{hash_password, verify_password};
use crate::clock::{format_ts, Clock};
use crate::db::{DbPool, Identity, IdentityStatus};
use crate::error::{Error, Result};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Proof presented for a password replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceAuthorization<'a> {
    /// A password-reset passcode was verified for this identity
    OtpVerified,
    /// The identity itself, authenticated by session token
    OwnSession { actor_id: &'a str },
}

/// Returns a message describing the first rule the password breaks.
pub fn check_password_policy(password: &str) -> Option<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Some("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Some("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain at least one digit".to_string());
    }
    None
}

pub struct CredentialStore {
    db: DbPool,
    otp_store: Arc<dyn OtpStore>,
    clock: Arc<dyn Clock>,
    reset_grant_ttl: Duration,
}

impl CredentialStore {
    pub fn new(
        db: DbPool,
        otp_store: Arc<dyn OtpStore>,
        clock: Arc<dyn Clock>,
        reset_grant_ttl_secs: i64,
    ) -> Self {
        Self {
            db,
            otp_store,
            clock,
            reset_grant_ttl: Duration::seconds(reset_grant_ttl_secs),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.db)
            .await?;
        Ok(identity)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(identity)
    }

    pub fn verify(&self, identity: &Identity, password: &str) -> bool {
        verify_password(password, &identity.password_hash)
    }

    /// Resolve an email/password pair to an active identity. Unknown email and
    /// wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self
            .find_by_email(email)
            .await?
            .ok_or(Error::Unauthenticated)?;

        if !self.verify(&identity, password) {
            return Err(Error::Unauthenticated);
        }
        if !identity.is_active() {
            return Err(Error::forbidden("Account is inactive"));
        }
        Ok(identity)
    }

    /// Record that `identity_id` just proved control of its mailbox.
    pub async fn grant_reset(&self, identity_id: &str) -> Result<()> {
        let now = self.clock.now();
        let result = sqlx::query(
            "UPDATE identities SET reset_verified_until = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_ts(now + self.reset_grant_ttl))
        .bind(format_ts(now))
        .bind(identity_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("identity"));
        }
        Ok(())
    }

    /// Withdraw an open reset grant, e.g. when the account is deactivated.
    pub async fn revoke_reset(&self, identity_id: &str) -> Result<()> {
        sqlx::query("UPDATE identities SET reset_verified_until = NULL WHERE id = ?")
            .bind(identity_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Replace the stored password hash. A reset grant only counts while the
    /// account is active.
    pub async fn replace(
        &self,
        identity_id: &str,
        new_password: &str,
        authorization: ReplaceAuthorization<'_>,
    ) -> Result<()> {
        if let Some(problem) = check_password_policy(new_password) {
            return Err(Error::Validation(problem));
        }

        let password_hash = hash_password(new_password)
            .map_err(|e| Error::internal(format!("failed to hash password: {}", e)))?;
        let now = format_ts(self.clock.now());

        let result = match authorization {
            ReplaceAuthorization::OtpVerified => {
                sqlx::query(
                    "UPDATE identities SET password_hash = ?, reset_verified_until = NULL, updated_at = ?
                     WHERE id = ? AND status = ?
                       AND reset_verified_until IS NOT NULL AND reset_verified_until > ?",
                )
                .bind(&password_hash)
                .bind(&now)
                .bind(identity_id)
                .bind(IdentityStatus::Active)
                .bind(&now)
                .execute(&self.db)
                .await?
            }
            ReplaceAuthorization::OwnSession { actor_id } => {
                if actor_id != identity_id {
                    return Err(Error::forbidden("Cannot change another account's password"));
                }
                sqlx::query(
                    "UPDATE identities SET password_hash = ?, reset_verified_until = NULL, updated_at = ?
                     WHERE id = ?",
                )
                .bind(&password_hash)
                .bind(&now)
                .bind(identity_id)
                .execute(&self.db)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return match authorization {
                ReplaceAuthorization::OtpVerified => {
                    warn!(identity = %identity_id, "Password change attempted without verified OTP");
                    Err(Error::forbidden(
                        "Verify a one-time passcode before changing the password",
                    ))
                }
                ReplaceAuthorization::OwnSession { .. } => Err(Error::NotFound("identity")),
            };
        }

        self.otp_store.clear_subject(identity_id).await?;
        info!(identity = %identity_id, "Password replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryOtpStore, OtpChallenge, OtpKey, OtpPurpose};
    use crate::clock::ManualClock;
    use crate::db::testing::{insert_identity_with_hash, memory_pool};
    use crate::db::Role;
    use chrono::Utc;

    struct Fixture {
        store: CredentialStore,
        otp_store: Arc<MemoryOtpStore>,
        clock: Arc<ManualClock>,
        identity_id: String,
    }

    async fn fixture() -> Fixture {
        let pool = memory_pool().await;
        let hash = hash_password("Original-Pass1").unwrap();
        let identity_id =
            insert_identity_with_hash(&pool, "alice@co.com", Role::Technician, None, &hash).await;
        let otp_store = Arc::new(MemoryOtpStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = CredentialStore::new(pool, otp_store.clone(), clock.clone(), 600);
        Fixture {
            store,
            otp_store,
            clock,
            identity_id,
        }
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password_policy("Short1").is_some());
        assert!(check_password_policy("alllowercase1").is_some());
        assert!(check_password_policy("ALLUPPERCASE1").is_some());
        assert!(check_password_policy("NoDigitsHere").is_some());
        assert!(check_password_policy("Good-Enough1").is_none());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let f = fixture().await;
        let identity = f
            .store
            .authenticate("ALICE@co.com", "Original-Pass1")
            .await
            .unwrap();
        assert_eq!(identity.id, f.identity_id);

        assert!(matches!(
            f.store.authenticate("alice@co.com", "wrong").await,
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(
            f.store.authenticate("nobody@co.com", "Original-Pass1").await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_inactive_identity_cannot_authenticate() {
        let f = fixture().await;
        sqlx::query("UPDATE identities SET status = 'Inactive' WHERE id = ?")
            .bind(&f.identity_id)
            .execute(&f.store.db)
            .await
            .unwrap();
        assert!(matches!(
            f.store.authenticate("alice@co.com", "Original-Pass1").await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_without_grant_is_forbidden() {
        let f = fixture().await;
        let result = f
            .store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert!(f
            .store
            .authenticate("alice@co.com", "Original-Pass1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_grant_is_single_use() {
        let f = fixture().await;
        f.store.grant_reset(&f.identity_id).await.unwrap();
        f.store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await
            .unwrap();

        assert!(f
            .store
            .authenticate("alice@co.com", "Brand-New-Pass2")
            .await
            .is_ok());
        let again = f
            .store
            .replace(&f.identity_id, "Third-Pass-333", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(again, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_grant_dies_with_the_account() {
        let f = fixture().await;
        f.store.grant_reset(&f.identity_id).await.unwrap();
        sqlx::query("UPDATE identities SET status = 'Inactive' WHERE id = ?")
            .bind(&f.identity_id)
            .execute(&f.store.db)
            .await
            .unwrap();
        let result = f
            .store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));

        sqlx::query("UPDATE identities SET status = 'Active' WHERE id = ?")
            .bind(&f.identity_id)
            .execute(&f.store.db)
            .await
            .unwrap();
        f.store.grant_reset(&f.identity_id).await.unwrap();
        f.store.revoke_reset(&f.identity_id).await.unwrap();
        let result = f
            .store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_grant_expires() {
        let f = fixture().await;
        f.store.grant_reset(&f.identity_id).await.unwrap();
        f.clock.advance(Duration::seconds(601));
        let result = f
            .store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_own_session_replace() {
        let f = fixture().await;
        let other = f
            .store
            .replace(
                &f.identity_id,
                "Brand-New-Pass2",
                ReplaceAuthorization::OwnSession { actor_id: "someone-else" },
            )
            .await;
        assert!(matches!(other, Err(Error::Forbidden(_))));

        f.store
            .replace(
                &f.identity_id,
                "Brand-New-Pass2",
                ReplaceAuthorization::OwnSession {
                    actor_id: &f.identity_id,
                },
            )
            .await
            .unwrap();
        assert!(f
            .store
            .authenticate("alice@co.com", "Brand-New-Pass2")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_weak_password_rejected_before_grant_is_spent() {
        let f = fixture().await;
        f.store.grant_reset(&f.identity_id).await.unwrap();
        let weak = f
            .store
            .replace(&f.identity_id, "weak", ReplaceAuthorization::OtpVerified)
            .await;
        assert!(matches!(weak, Err(Error::Validation(_))));
        assert!(f
            .store
            .replace(&f.identity_id, "Brand-New-Pass2", ReplaceAuthorization::OtpVerified)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_replace_invalidates_outstanding_passcodes() {
        let f = fixture().await;
        let key = OtpKey::new(f.identity_id.clone(), OtpPurpose::PasswordReset);
        f.otp_store
            .put(
                &key,
                OtpChallenge {
                    challenge_id: "c1".to_string(),
                    target: "alice@co.com".to_string(),
                    code_hash: "h".to_string(),
                    attempts: 0,
                    issued_at: 0,
                    expires_at: i64::MAX,
                },
            )
            .await
            .unwrap();

        f.store
            .replace(
                &f.identity_id,
                "Brand-New-Pass2",
                ReplaceAuthorization::OwnSession {
                    actor_id: &f.identity_id,
                },
            )
            .await
            .unwrap();
        assert!(f.otp_store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_for_unknown_identity() {
        let f = fixture().await;
        assert!(matches!(
            f.store.grant_reset("missing").await,
            Err(Error::NotFound("identity"))
        ));
    }
}
