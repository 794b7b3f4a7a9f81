//! Identity proof: password credentials, one-time passcodes, session tokens and
//! the role allow-list consulted by every protected operation.

pub mod credentials;
pub mod otp;
pub mod otp_store;
pub mod rbac;
pub mod token;

pub use credentials::{CredentialStore, ReplaceAuthorization};
pub use otp::{OtpChallenge, OtpKey, OtpPurpose, OtpService, OtpStore};
pub use otp_store::{MemoryOtpStore, SqliteOtpStore};
pub use rbac::{Actor, Operation};
pub use token::{Claims, TokenAuthority};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
