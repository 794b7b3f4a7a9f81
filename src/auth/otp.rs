//! One-time passcodes.
//!
//! A challenge is keyed by (subject, purpose). Issuing a new code for the same
//! key supersedes the previous one. Codes are six random digits, stored only as
//! a keyed HMAC, valid for a fixed window, and consumed by the first successful
//! verification. A challenge that collects too many wrong guesses is discarded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notifications::{Mailer, OtpEmail};

type HmacSha256 = Hmac<Sha256>;

/// Number of digits in a passcode.
pub const OTP_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    PasswordReset,
    EmailChange,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::PasswordReset => "password_reset",
            OtpPurpose::EmailChange => "email_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtpKey {
    pub subject: String,
    pub purpose: OtpPurpose,
}

impl OtpKey {
    pub fn new(subject: impl Into<String>, purpose: OtpPurpose) -> Self {
        Self {
            subject: subject.into(),
            purpose,
        }
    }
}

/// Stored state of an outstanding passcode. Times are Unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpChallenge {
    pub challenge_id: String,
    /// Address the code was delivered to
    pub target: String,
    pub code_hash: String,
    pub attempts: u32,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl OtpChallenge {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at
    }
}

/// Persistence for outstanding challenges, at most one per key.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a challenge, replacing whatever was there for the key.
    async fn put(&self, key: &OtpKey, challenge: OtpChallenge) -> Result<()>;

    async fn get(&self, key: &OtpKey) -> Result<Option<OtpChallenge>>;

    /// Remove the challenge only if it is still `challenge_id`. Returns whether
    /// this call removed it.
    async fn consume(&self, key: &OtpKey, challenge_id: &str) -> Result<bool>;

    /// Count a wrong guess against `challenge_id`. Returns the new attempt count,
    /// or `None` when the challenge is gone or was superseded.
    async fn record_failure(&self, key: &OtpKey, challenge_id: &str) -> Result<Option<u32>>;

    /// Drop every challenge held for `subject`.
    async fn clear_subject(&self, subject: &str) -> Result<()>;
}

pub struct OtpService {
    store: Arc<dyn OtpStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    secret: Vec<u8>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        secret: &str,
        ttl_secs: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_secs),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate a fresh code for `subject`, store it (superseding any earlier
    /// one) and deliver it to `target`. The challenge stays stored when delivery
    /// fails, so the caller can surface the relay error and the user can simply
    /// request a new code.
    pub async fn issue(&self, subject: &str, purpose: OtpPurpose, target: &str) -> Result<String> {
        let key = OtpKey::new(subject, purpose);
        let code = generate_code();
        let now = self.clock.now();

        let challenge = OtpChallenge {
            challenge_id: uuid::Uuid::new_v4().to_string(),
            target: target.trim().to_lowercase(),
            code_hash: self.hash_code(&key, &code)?,
            attempts: 0,
            issued_at: now.timestamp_millis(),
            expires_at: (now + self.ttl).timestamp_millis(),
        };
        let target = challenge.target.clone();
        self.store.put(&key, challenge).await?;

        info!(subject = %subject, purpose = purpose.as_str(), "OTP issued");

        self.mailer
            .send_otp(OtpEmail {
                to: &target,
                code: &code,
                purpose,
                valid_minutes: self.ttl.num_minutes(),
            })
            .await
            .map_err(|e| {
                warn!(subject = %subject, error = %e, "OTP delivery failed");
                Error::dependency("email", e.to_string())
            })?;

        Ok(code)
    }

    /// Check `supplied` against the outstanding challenge and consume it on a
    /// match. Returns the consumed challenge so callers can read its target.
    pub async fn verify(
        &self,
        subject: &str,
        purpose: OtpPurpose,
        supplied: &str,
    ) -> Result<OtpChallenge> {
        let key = OtpKey::new(subject, purpose);
        let challenge = self.store.get(&key).await?.ok_or(Error::OtpNotRequested)?;

        if challenge.is_expired(self.clock.now().timestamp_millis()) {
            self.store.consume(&key, &challenge.challenge_id).await?;
            return Err(Error::OtpExpired);
        }

        let supplied_hash = self.hash_code(&key, supplied.trim())?;
        let matches: bool = supplied_hash
            .as_bytes()
            .ct_eq(challenge.code_hash.as_bytes())
            .into();

        if !matches {
            let attempts = self
                .store
                .record_failure(&key, &challenge.challenge_id)
                .await?;
            if attempts.is_some_and(|n| n >= self.max_attempts) {
                warn!(subject = %subject, purpose = purpose.as_str(), "OTP discarded after too many attempts");
                self.store.consume(&key, &challenge.challenge_id).await?;
            }
            return Err(Error::OtpMismatch);
        }

        // Losing this race means another request already used the code.
        if !self.store.consume(&key, &challenge.challenge_id).await? {
            return Err(Error::OtpNotRequested);
        }

        info!(subject = %subject, purpose = purpose.as_str(), "OTP verified");
        Ok(challenge)
    }

    /// Drop every outstanding challenge for `subject`.
    pub async fn invalidate_all(&self, subject: &str) -> Result<()> {
        self.store.clear_subject(subject).await
    }

    fn hash_code(&self, key: &OtpKey, code: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::internal(format!("invalid OTP key: {}", e)))?;
        mac.update(key.subject.as_bytes());
        mac.update(b":");
        mac.update(key.purpose.as_str().as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Six uniformly random digits, leading zeros kept.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:0width$}", n, width = OTP_DIGITS)
}
