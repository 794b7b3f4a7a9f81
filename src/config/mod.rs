use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Minimum accepted length of the token signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Upper bound for a single request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Prefix used when building public URLs for uploaded files
    #[serde(default)]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            request_timeout_secs: default_request_timeout(),
            public_url: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection string, e.g. `sqlite:./data/workdesk.db?mode=rwc`
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtpStoreKind {
    /// Challenges live in the shared database (safe with several instances)
    Database,
    /// Process-local map; only valid for a single instance
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_secs: i64,
    #[serde(default = "default_otp_max_attempts")]
    pub otp_max_attempts: u32,
    #[serde(default = "default_otp_store")]
    pub otp_store: OtpStoreKind,
    /// How long a verified password-reset OTP allows a password change
    #[serde(default = "default_reset_grant_ttl")]
    pub reset_grant_ttl_secs: i64,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
    #[serde(default = "default_bootstrap_admin_name")]
    pub bootstrap_admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_days: default_token_ttl_days(),
            otp_ttl_secs: default_otp_ttl(),
            otp_max_attempts: default_otp_max_attempts(),
            otp_store: default_otp_store(),
            reset_grant_ttl_secs: default_reset_grant_ttl(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
            bootstrap_admin_name: default_bootstrap_admin_name(),
        }
    }
}

fn default_token_ttl_days() -> i64 {
    7
}

fn default_otp_ttl() -> i64 {
    5 * 60
}

fn default_otp_max_attempts() -> u32 {
    5
}

fn default_otp_store() -> OtpStoreKind {
    OtpStoreKind::Database
}

fn default_reset_grant_ttl() -> i64 {
    10 * 60
}

fn default_bootstrap_admin_name() -> String {
    "Administrator".to_string()
}

/// Outbound SMTP settings used for OTP delivery
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    465
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Workdesk".to_string()
}

impl EmailConfig {
    /// Names of the SMTP settings that are still missing.
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.smtp_host) {
            missing.push("email.smtp_host");
        }
        if is_blank(&self.smtp_username) {
            missing.push("email.smtp_username");
        }
        if is_blank(&self.smtp_password) {
            missing.push("email.smtp_password");
        }
        if is_blank(&self.from_address) {
            missing.push("email.from_address");
        }
        missing
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_max_files")]
    pub max_files_per_request: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            max_file_bytes: default_max_file_bytes(),
            max_files_per_request: default_max_files(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_files() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub jwt_secret: Option<String>,
    pub database_url: Option<String>,
    pub smtp_password: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(secret) = overrides.jwt_secret {
            self.auth.jwt_secret = secret;
        }
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(password) = overrides.smtp_password {
            self.email.smtp_password = Some(password);
        }
    }

    /// Reject configurations that lack a required external input.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.auth.jwt_secret.is_empty() {
            problems.push("auth.jwt_secret is required".to_string());
        } else if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            problems.push(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            ));
        }
        if self.database.url.trim().is_empty() {
            problems.push("database.url is required".to_string());
        }
        for field in self.email.missing_fields() {
            problems.push(format!("{} is required", field));
        }
        if self.auth.token_ttl_days <= 0 {
            problems.push("auth.token_ttl_days must be positive".to_string());
        }
        if self.auth.otp_ttl_secs <= 0 {
            problems.push("auth.otp_ttl_secs must be positive".to_string());
        }
        if self.auth.otp_max_attempts == 0 {
            problems.push("auth.otp_max_attempts must be at least 1".to_string());
        }
        if self.auth.bootstrap_admin_email.is_some() != self.auth.bootstrap_admin_password.is_some() {
            problems.push(
                "auth.bootstrap_admin_email and auth.bootstrap_admin_password must be set together"
                    .to_string(),
            );
        }

        if !problems.is_empty() {
            bail!("Invalid configuration: {}", problems.join("; "));
        }
        Ok(())
    }
}
