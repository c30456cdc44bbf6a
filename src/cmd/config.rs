//! Configuration view and validation commands — `tutor config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(config_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use tutor::config::{CONFIG_FILE, TutorToml};

    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Tutor Configuration");
            println!("===================");
            println!();

            let mut config = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                TutorToml::load(&config_path)?
            } else {
                println!("No tutor.toml found at {}", config_path.display());
                println!("Using default configuration.");
                TutorToml::default()
            };
            println!();

            println!("Effective values (with env overrides):");
            config.apply_env();
            println!("{}", toml::to_string_pretty(&config)?);

            let key_state = if std::env::var(&config.oracle.api_key_env).is_ok() {
                "set"
            } else {
                "NOT set"
            };
            println!("API key ${} is {}", config.oracle.api_key_env, key_state);
            if !config_path.exists() {
                println!();
                println!("Run 'tutor config init' to create a tutor.toml file.");
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No tutor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = TutorToml::load(&config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("tutor.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            TutorToml::default().save(&config_path)?;

            println!("Created tutor.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, db_path, dev_mode");
            println!("  - [oracle] endpoint, model, api_key_env");
            println!("  - [dialogue] transcript_limit, allow_reassessment, greeting");
            println!();
        }
    }

    Ok(())
}
