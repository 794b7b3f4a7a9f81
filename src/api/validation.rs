//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an ApiError,
//! use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::credentials::check_password_policy;

lazy_static! {
    /// Pragmatic email shape check; delivery proves the rest
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Digits with optional leading + and common separators
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9][0-9 ()-]{5,19}$").unwrap();

    /// Exactly six digits
    static ref OTP_REGEX: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate a person or department name
pub fn validate_name(name: &str, field_name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if name.chars().count() > 100 {
        return Err(format!("{} must be at most 100 characters", field_name));
    }
    Ok(())
}

/// Validate an optional phone number
pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    match phone.as_deref().map(str::trim) {
        None | Some("") => Ok(()),
        Some(p) if PHONE_REGEX.is_match(p) => Ok(()),
        Some(_) => Err("Invalid phone number".to_string()),
    }
}

/// Validate a new password against the password policy
pub fn validate_password(password: &str) -> Result<(), String> {
    match check_password_policy(password) {
        Some(problem) => Err(problem),
        None => Ok(()),
    }
}

/// Validate the shape of a submitted passcode
pub fn validate_otp(otp: &str) -> Result<(), String> {
    if OTP_REGEX.is_match(otp.trim()) {
        Ok(())
    } else {
        Err("OTP must be 6 digits".to_string())
    }
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}
