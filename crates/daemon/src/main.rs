//! dirauth daemon entry point.
//!
//! Loads configuration, opens the local account database, builds the
//! authentication resolver, serves the HTTP API, and handles graceful
//! shutdown.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dirauth_core::auth::{DirectoryConnector, LdapDirectory, LocalAccountStore, LocalAuthenticator};
use dirauth_core::config::AppConfig;
use dirauth_core::db::Database;
use dirauth_core::AuthResolver;
use dirauth_web::WebServer;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// dirauth authentication service.
#[derive(Parser, Debug)]
#[command(
    name = "dirauthd",
    version,
    about = "Directory-backed authentication service with local fallback"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load, resolve secrets, validate
    let config = AppConfig::load_and_resolve(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    let directory = &config.directory;
    info!("========================================");
    info!("  dirauth v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Directory     : {}", if directory.enabled { directory.url.as_str() } else { "disabled" });
    info!("Search base   : {}", directory.search_base);
    info!("Role mapping  : {}", if directory.role_mapping.enabled { "enabled" } else { "disabled" });
    info!("Local auth    : {}", directory.allow_local_auth);
    info!("Web listen    : {}", config.server.listen);
    info!("Data dir      : {}", config.server.data_dir.display());
    info!("Log level     : {}", log_level);
    info!("========================================");

    let db_path = config.server.database_path();
    let db = Arc::new(
        Database::open_initialized(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    info!("Database initialized at {}", db_path.display());

    let local: Option<Arc<dyn LocalAuthenticator>> = if directory.allow_local_auth {
        Some(Arc::new(LocalAccountStore::new(Arc::clone(&db))))
    } else {
        None
    };

    let connector: Arc<dyn DirectoryConnector> = Arc::new(LdapDirectory::new(directory));
    let resolver = Arc::new(AuthResolver::new(directory.clone(), connector, local));

    let listen_addr = config.server.listen.clone();
    let web_server = WebServer::new(config, resolver, db);

    let mut web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start(&listen_addr).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::select! {
        _ = signals::wait_for_shutdown() => {
            info!("Shutdown signal received, stopping...");
        }
        result = &mut web_handle => {
            if let Err(e) = result {
                warn!("web server task ended unexpectedly: {}", e);
            }
            anyhow::bail!("web server exited");
        }
    }

    web_handle.abort();
    info!("dirauth daemon stopped.");
    Ok(())
}
