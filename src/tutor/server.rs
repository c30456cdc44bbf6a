use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::db::{DbHandle, TutorDb};
use super::engine::TurnEngine;
use super::oracle::{OpenAiOracle, Oracle};
use crate::config::{DialogueSettings, OracleSettings, TutorToml};

/// Configuration for the tutor server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub oracle: OracleSettings,
    pub dialogue: DialogueSettings,
}

impl From<&TutorToml> for ServerConfig {
    fn from(toml: &TutorToml) -> Self {
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            db_path: toml.server.db_path.clone(),
            dev_mode: toml.server.dev_mode,
            oracle: toml.oracle.clone(),
            dialogue: toml.dialogue.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&TutorToml::default())
    }
}

/// Build the full application router around shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the store, oracle and dialogue engine into shared state.
pub fn build_state(db: TutorDb, oracle: Arc<dyn Oracle>, dialogue: DialogueSettings) -> Arc<AppState> {
    let db = DbHandle::new(db);
    let engine = TurnEngine::new(Arc::new(db.clone()), oracle, dialogue.clone());
    Arc::new(AppState {
        db,
        engine,
        dialogue,
    })
}

/// Create (or migrate) the database file, including its parent directory.
pub fn init_database(db_path: &Path) -> Result<TutorDb> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    TutorDb::new(db_path).context("Failed to initialize tutor database")
}

/// Start the tutor server and run until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = init_database(&config.db_path)?;

    let oracle = OpenAiOracle::new(&config.oracle);
    if !oracle.has_api_key() {
        warn!(
            var = %config.oracle.api_key_env,
            "oracle API key not set; turns will fail until it is provided"
        );
    }

    let state = build_state(db, Arc::new(oracle), config.dialogue.clone());
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { config.host.as_str() };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        model = %config.oracle.model,
        "tutor server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler; shutdown only by kill");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
