//! Tutoring server command — `tutor serve`.

use anyhow::Result;
use std::path::PathBuf;

use tutor::config::TutorToml;
use tutor::tutor::server::{self, ServerConfig};

pub async fn cmd_serve(
    mut toml: TutorToml,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
    init: bool,
) -> Result<()> {
    if let Some(port) = port {
        toml.server.port = port;
    }
    if let Some(db_path) = db_path {
        toml.server.db_path = db_path;
    }
    if dev {
        toml.server.dev_mode = true;
    }

    for warning in toml.validate() {
        tracing::warn!(%warning, "configuration warning");
    }

    if init {
        server::init_database(&toml.server.db_path)?;
        println!("Tutor database initialized at {}", toml.server.db_path.display());
        return Ok(());
    }

    server::start_server(ServerConfig::from(&toml)).await
}
