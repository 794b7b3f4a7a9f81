pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod notifications;
pub mod storage;
pub mod tasks;

pub use db::DbPool;

use std::sync::Arc;

use auth::{CredentialStore, MemoryOtpStore, OtpService, OtpStore, SqliteOtpStore, TokenAuthority};
use clock::Clock;
use config::{Config, OtpStoreKind};
use notifications::Mailer;
use storage::FileStore;
use tasks::{SqliteTaskRepository, TaskService};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub clock: Arc<dyn Clock>,
    pub tokens: TokenAuthority,
    pub credentials: CredentialStore,
    pub otp: OtpService,
    pub tasks: TaskService,
    pub files: Arc<dyn FileStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        mailer: Arc<dyn Mailer>,
        files: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let otp_store: Arc<dyn OtpStore> = match config.auth.otp_store {
            OtpStoreKind::Database => Arc::new(SqliteOtpStore::new(db.clone())),
            OtpStoreKind::Memory => Arc::new(MemoryOtpStore::new()),
        };

        let tokens = TokenAuthority::new(&config.auth.jwt_secret, config.auth.token_ttl_days);
        let otp = OtpService::new(
            otp_store.clone(),
            mailer,
            clock.clone(),
            &config.auth.jwt_secret,
            config.auth.otp_ttl_secs,
            config.auth.otp_max_attempts,
        );
        let credentials = CredentialStore::new(
            db.clone(),
            otp_store,
            clock.clone(),
            config.auth.reset_grant_ttl_secs,
        );
        let tasks = TaskService::new(
            Arc::new(SqliteTaskRepository::new(db.clone())),
            clock.clone(),
        );

        Self {
            config,
            db,
            clock,
            tokens,
            credentials,
            otp,
            tasks,
            files,
        }
    }
}
