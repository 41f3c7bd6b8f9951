//! Layered service configuration
//!
//! Defaults, then an optional TOML file, then `SKINAI_*` environment
//! variables with `__` separating nested keys, e.g.
//! `SKINAI_MODEL__SOURCE=gdrive:<id>` or
//! `SKINAI_MODEL__CLASS_NAMES=chickenpox,hfmd,measles,unknown`.

use config::{Config, Environment, File, FileFormat};
use model_provisioner::ProvisionerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SKINAI";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SKINAI_CONFIG";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "skinai.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address
    pub bind_addr: String,
    /// Largest accepted image upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Max level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Parsed max level
    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.level.trim())
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

/// Service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ProvisionerConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from `SKINAI_CONFIG` (or `skinai.toml`) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::from_sources(path.as_deref().map(Path::new), None)
    }

    /// Load from an optional file and an optional environment map.
    ///
    /// When `env` is `None` the process environment is used.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false)),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("model.class_names")
            .try_parsing(true)
            .source(env);

        let settings: Settings = builder.add_source(environment).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_host_port(&self.server.bind_addr) {
            return Err(ConfigError::Invalid(format!(
                "server.bind_addr '{}' is not host:port",
                self.server.bind_addr
            )));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_upload_bytes must be > 0".into()));
        }
        if self.model.max_attempts == 0 {
            return Err(ConfigError::Invalid("model.max_attempts must be >= 1".into()));
        }
        if self.model.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("model.fetch_timeout_ms must be > 0".into()));
        }
        if self.model.stall_timeout_ms == 0 {
            return Err(ConfigError::Invalid("model.stall_timeout_ms must be > 0".into()));
        }
        if self.model.source.trim().is_empty() {
            return Err(ConfigError::Invalid("model.source is empty".into()));
        }

        self.logging.level()?;
        Ok(())
    }
}

/// Socket address or `host:port` with a named host, resolved at bind time
fn is_host_port(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(char::is_whitespace) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
