use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workdesk::clock::SystemClock;
use workdesk::config::{Config, Overrides};
use workdesk::notifications::email::SmtpMailer;
use workdesk::storage::LocalFileStore;
use workdesk::AppState;

#[derive(Parser, Debug)]
#[command(name = "workdesk")]
#[command(author, version, about = "Workforce task tracking with manager approvals", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "workdesk.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Token signing secret
    #[arg(long, env = "WORKDESK_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// SQLite connection string
    #[arg(long, env = "WORKDESK_DATABASE_URL")]
    database_url: Option<String>,

    /// SMTP relay password
    #[arg(long, env = "WORKDESK_SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;
    config.apply_overrides(Overrides {
        jwt_secret: cli.jwt_secret,
        database_url: cli.database_url,
        smtp_password: cli.smtp_password,
    });

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Workdesk v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    for dir in [&config.server.data_dir, &config.storage.uploads_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    // Initialize database
    let db = workdesk::db::init(&config.database.url).await?;

    workdesk::api::auth::ensure_bootstrap_admin(&db, &config.auth).await?;

    let mailer = Arc::new(SmtpMailer::new(config.email.clone()));
    let files = Arc::new(LocalFileStore::new(
        &config.storage.uploads_dir,
        &config.server.public_url,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        db,
        mailer,
        files,
        Arc::new(SystemClock),
    ));
    let app = workdesk::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
