//! Configuration for the tutor service, read from `.tutor/tutor.toml`.
//!
//! Layered file → environment → CLI. Every field has a default, so a missing
//! file is not an error.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5001
//! db_path = ".tutor/tutor.db"
//! dev_mode = false
//!
//! [oracle]
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [dialogue]
//! transcript_limit = 100
//! allow_reassessment = false
//! greeting = "This is your personal AiChatBot, what can I help you study today?"
//! default_title = "New Academic Chat"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "tutor.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS and bind on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".tutor/tutor.db")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// Text-completion endpoint settings. The key itself never lives in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueSettings {
    /// Newest messages included in material and question prompts.
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,
    /// Probe readiness again after a graded assessment instead of plain chat.
    #[serde(default)]
    pub allow_reassessment: bool,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_title")]
    pub default_title: String,
}

fn default_transcript_limit() -> usize {
    100
}

fn default_greeting() -> String {
    "This is your personal AiChatBot, what can I help you study today?".to_string()
}

fn default_title() -> String {
    "New Academic Chat".to_string()
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            transcript_limit: default_transcript_limit(),
            allow_reassessment: false,
            greeting: default_greeting(),
            default_title: default_title(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit newline-delimited JSON records.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// The complete tutor.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TutorToml {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub dialogue: DialogueSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl TutorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse tutor.toml")
    }

    /// Load `tutor.toml` from `config_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize tutor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `TUTOR_*` environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("TUTOR_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("TUTOR_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(endpoint) = lookup("TUTOR_ORACLE_ENDPOINT") {
            self.oracle.endpoint = endpoint;
        }
        if let Some(model) = lookup("TUTOR_MODEL") {
            self.oracle.model = model;
        }
        if let Some(level) = lookup("TUTOR_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("TUTOR_LOG_JSON") {
            self.logging.json = json == "1" || json.eq_ignore_ascii_case("true");
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.oracle.model.trim().is_empty() {
            warnings.push("oracle.model is empty".to_string());
        }
        if !self.oracle.endpoint.starts_with("http://")
            && !self.oracle.endpoint.starts_with("https://")
        {
            warnings.push(format!(
                "Invalid oracle.endpoint '{}': should be an http(s) URL",
                self.oracle.endpoint
            ));
        }
        if self.dialogue.transcript_limit == 0 {
            warnings.push(
                "dialogue.transcript_limit is 0: material and question prompts get no history"
                    .to_string(),
            );
        }
        if !is_valid_level(&self.logging.level) {
            warnings.push(format!(
                "Invalid logging.level '{}': expected trace, debug, info, warn or error",
                self.logging.level
            ));
        }

        warnings
    }
}

fn is_valid_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}
