//! Wall-clock access and timestamp formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current time. OTP expiry and reset grants read it through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a timestamp for storage. Fixed precision keeps string comparison in SQL ordered.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub use manual::ManualClock;
