//! Outbound notifications. The only message the service sends is the
//! one-time passcode email.

pub mod email;

pub use email::SmtpMailer;

use anyhow::Result;
use async_trait::async_trait;

use crate::auth::OtpPurpose;

/// A passcode ready for delivery.
#[derive(Debug, Clone, Copy)]
pub struct OtpEmail<'a> {
    pub to: &'a str,
    pub code: &'a str,
    pub purpose: OtpPurpose,
    pub valid_minutes: i64,
}

/// Delivery channel for passcodes.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, email: OtpEmail<'_>) -> Result<()>;
}

#[cfg(test)]
pub use recording::RecordingMailer;
