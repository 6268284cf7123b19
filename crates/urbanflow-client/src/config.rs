//! Configuration loading for the Urban Flow client.
//!
//! The optional configuration file is YAML (`urbanflow.yaml` at the project
//! root by default). Every field has a default, so an empty or missing file
//! yields a working local-development setup. Environment variables override
//! file values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;
use urbanflow_transport::{BackoffStrategy, ReconnectPolicy, TransportConfig};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "URBANFLOW_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A value is out of range or malformed.
    #[error("invalid config `{field}`: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Streaming connection settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// REST collaborator settings.
    #[serde(default)]
    pub rest: RestConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Console binary settings.
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl ClientConfig {
    /// Load configuration from a YAML file, apply environment overrides
    /// from the process environment, and validate the result.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Load from the file named by `URBANFLOW_CONFIG` if set, otherwise
    /// defaults; environment overrides apply either way.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|var| std::env::var(var).ok())
    }

    /// [`ClientConfig::load`] with an injectable environment.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env(CONFIG_PATH_VAR) {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                Self::parse(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables:
    ///
    /// - `URBANFLOW_WS_URL` -> `stream.url`
    /// - `URBANFLOW_API_URL` -> `rest.base_url`
    /// - `URBANFLOW_MAX_RECONNECT_ATTEMPTS` -> `stream.max_reconnect_attempts`
    /// - `URBANFLOW_RECONNECT_DELAY_MS` -> `stream.reconnect_base_delay_ms`
    /// - `URBANFLOW_BACKOFF` -> `stream.backoff`
    /// - `URBANFLOW_LOG_LEVEL` -> `logging.level`
    /// - `URBANFLOW_AUTOSTART_SCENARIO` -> `console.autostart_scenario`
    pub fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = env("URBANFLOW_WS_URL") {
            self.stream.url = val;
        }
        if let Some(val) = env("URBANFLOW_API_URL") {
            self.rest.base_url = val;
        }
        if let Some(val) = env("URBANFLOW_MAX_RECONNECT_ATTEMPTS") {
            self.stream.max_reconnect_attempts = parse_env("URBANFLOW_MAX_RECONNECT_ATTEMPTS", val)?;
        }
        if let Some(val) = env("URBANFLOW_RECONNECT_DELAY_MS") {
            self.stream.reconnect_base_delay_ms = parse_env("URBANFLOW_RECONNECT_DELAY_MS", val)?;
        }
        if let Some(val) = env("URBANFLOW_BACKOFF") {
            self.stream.backoff = match val.to_ascii_lowercase().as_str() {
                "linear" => BackoffStrategy::Linear,
                "exponential" => BackoffStrategy::Exponential,
                _ => {
                    return Err(ConfigError::Env {
                        var: "URBANFLOW_BACKOFF",
                        value: val,
                    });
                }
            };
        }
        if let Some(val) = env("URBANFLOW_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = env("URBANFLOW_AUTOSTART_SCENARIO") {
            self.console.autostart_scenario = Some(val).filter(|s| !s.is_empty());
        }
        Ok(())
    }

    /// Check values that deserialization alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = Url::parse(&self.stream.url).map_err(|e| ConfigError::Invalid {
            field: "stream.url",
            reason: e.to_string(),
        })?;
        if !matches!(stream.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid {
                field: "stream.url",
                reason: format!("scheme must be ws or wss, got `{}`", stream.scheme()),
            });
        }
        let rest = Url::parse(&self.rest.base_url).map_err(|e| ConfigError::Invalid {
            field: "rest.base_url",
            reason: e.to_string(),
        })?;
        if !matches!(rest.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "rest.base_url",
                reason: format!("scheme must be http or https, got `{}`", rest.scheme()),
            });
        }
        if self.stream.reconnect_base_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.reconnect_base_delay_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.stream.reconnect_max_delay_ms < self.stream.reconnect_base_delay_ms {
            return Err(ConfigError::Invalid {
                field: "stream.reconnect_max_delay_ms",
                reason: format!(
                    "must be at least reconnect_base_delay_ms ({})",
                    self.stream.reconnect_base_delay_ms
                ),
            });
        }
        if self.stream.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.connect_timeout_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if !(0.0..=1.0).contains(&self.stream.jitter) {
            return Err(ConfigError::Invalid {
                field: "stream.jitter",
                reason: format!("must be within [0, 1], got {}", self.stream.jitter),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Env { var, value }),
    }
}

/// Streaming connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    /// `WebSocket` endpoint.
    #[serde(default = "default_stream_url")]
    pub url: String,

    /// Reconnect attempts after a connection loss before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on a single reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Delay growth strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Fractional jitter applied to each delay.
    #[serde(default)]
    pub jitter: f64,

    /// Deadline for opening one connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl StreamConfig {
    /// The transport settings these values describe.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts,
                base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                strategy: self.backoff,
                jitter: self.jitter,
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: 0.0,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// REST collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RestConfig {
    /// API base URL, without a trailing slash.
    #[serde(default = "default_rest_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_rest_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_base_url(),
            timeout_ms: default_rest_timeout_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Console binary settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsoleConfig {
    /// How often to log the dashboard summary, in milliseconds.
    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u64,

    /// Scenario to start once connected.
    #[serde(default)]
    pub autostart_scenario: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            summary_interval_ms: default_summary_interval_ms(),
            autostart_scenario: None,
        }
    }
}

fn default_stream_url() -> String {
    "ws://localhost:5000/ws".to_owned()
}

const fn default_max_reconnect_attempts() -> u32 {
    5
}

const fn default_reconnect_base_delay_ms() -> u64 {
    3000
}

const fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_rest_base_url() -> String {
    "http://localhost:5000/api".to_owned()
}

const fn default_rest_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_summary_interval_ms() -> u64 {
    2000
}
