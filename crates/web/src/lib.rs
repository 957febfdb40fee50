//! dirauth web server.
//!
//! Provides an Axum-based HTTP server with:
//! - A health endpoint for liveness checks
//! - A login endpoint backed by [`AuthResolver`], auditing every attempt

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use dirauth_core::config::AppConfig;
use dirauth_core::db::Database;
use dirauth_core::AuthResolver;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub resolver: Arc<AuthResolver>,
    /// Audit log sink.
    pub db: Arc<Database>,
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig, resolver: Arc<AuthResolver>, db: Arc<Database>) -> Self {
        let state = Arc::new(AppState {
            config,
            resolver,
            db,
        });
        Self { state }
    }

    /// Build the router with all routes and middleware attached.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .merge(api::status::routes())
            .merge(api::auth::routes())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the web server, listening on the given address.
    pub async fn start(self, listen_addr: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = listen_addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = self.router();
        info!(addr = %listener.local_addr()?, "starting web server");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
