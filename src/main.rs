use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tutor::config::{LoggingSettings, TutorToml};

mod cmd;

#[derive(Parser)]
#[command(name = "tutor")]
#[command(version, about = "Study chat and self-assessment tutor service")]
pub struct Cli {
    /// Force debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding tutor.toml
    #[arg(long, global = true, default_value = ".tutor")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP tutoring service
    Serve {
        /// Port to serve on (overrides tutor.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides tutor.toml)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,

        /// Initialize database only (don't start server)
        #[arg(long)]
        init: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show file and effective configuration
    Show,
    /// Check tutor.toml and list warnings
    Validate,
    /// Write a default tutor.toml
    Init,
}

/// Filter precedence: `--verbose`, then `RUST_LOG`, then the configured level.
fn init_tracing(verbose: bool, logging: &LoggingSettings) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(f) => f,
            Err(_) => match logging.level.parse::<EnvFilter>() {
                Ok(f) => f,
                Err(e) => {
                    eprintln!(
                        "WARN: logging.level='{}' is not a valid tracing filter ({}); \
                         falling back to 'info'",
                        logging.level, e
                    );
                    EnvFilter::new("info")
                }
            },
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut toml = TutorToml::load_or_default(&cli.config_dir)?;
    toml.apply_env();
    init_tracing(cli.verbose, &toml.logging);

    match &cli.command {
        Commands::Serve {
            port,
            db_path,
            dev,
            init,
        } => {
            cmd::cmd_serve(toml, *port, db_path.clone(), *dev, *init).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config_dir, command.clone())?,
    }

    Ok(())
}
