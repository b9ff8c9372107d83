//! bib-server - BiB backend
//!
//! Serves the catalog proxy, analytics intake, groups and invites, and the
//! service-role budget guard from one SQLite-backed process.

use anyhow::Result;
use bib_common::api::load_shared_secret;
use bib_common::config::{load_config, RootFolderInitializer, RootFolderResolver};
use bib_common::db::init_database;
use bib_server::db::sessions;
use bib_server::{build_router, AppState};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, reload, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "bib-server", version, about = "BiB backend server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "BIB_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding bib.db
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config file has been read
    let rust_log_set = std::env::var("RUST_LOG").is_ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, filter_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting bib-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    if !rust_log_set {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(level) => {
                if let Err(e) = filter_handle.reload(level) {
                    warn!("Failed to apply logging.level: {}", e);
                }
            }
            Err(e) => warn!("Ignoring invalid logging.level {:?}: {}", config.logging.level, e),
        }
    }

    let root_folder = RootFolderResolver::new("bib-server")
        .with_cli_arg(args.root_folder)
        .with_toml_root(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let purged = sessions::purge_expired(&pool).await?;
    if purged > 0 {
        info!("Purged {} expired sessions", purged);
    }

    let service_secret = load_shared_secret(&pool, config.auth.service_secret).await?;
    if service_secret == 0 {
        warn!("Service-role authentication disabled (shared secret = 0)");
    } else {
        info!("✓ Loaded service-role shared secret");
    }

    let bind = config.server.bind.clone();
    let state = AppState::new(pool, config, service_secret)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("bib-server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("bib-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
