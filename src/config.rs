//! Configuration for the echo relay server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the relay server
#[derive(Parser, Debug)]
#[command(name = "ws-echo-relay")]
#[command(version = "0.1.0")]
#[command(about = "A WebSocket echo relay server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:9001)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// URL path routed to the relay (e.g., /)
    #[arg(short = 'p', long)]
    pub path: Option<String>,

    /// Echo buffer capacity in bytes; frames up to this size are buffered,
    /// larger frames are streamed
    #[arg(short = 'b', long)]
    pub buffer_size: Option<usize>,

    /// Enable TCP fast-open on the listening socket
    #[arg(long)]
    pub tcp_fastopen: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// URL path routed to the relay
    #[serde(default = "default_path")]
    pub path: String,
    /// TCP fast-open toggle
    #[serde(default)]
    pub tcp_fastopen: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            tcp_fastopen: false,
        }
    }
}

/// Relay-related configuration
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// Echo buffer capacity in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

/// Timeout configuration, all in milliseconds
#[derive(Debug, Deserialize)]
pub struct TimeoutConfig {
    /// Limit on reading the HTTP upgrade request
    #[serde(default = "default_header_read_ms")]
    pub header_read_ms: u64,
    /// Limit on waiting for further chunks of a partially relayed frame
    #[serde(default = "default_body_read_ms")]
    pub body_read_ms: u64,
    /// Limit on each outbound write
    #[serde(default = "default_response_ms")]
    pub response_ms: u64,
    /// Limit on the close handshake at teardown
    #[serde(default = "default_close_ms")]
    pub close_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_read_ms: default_header_read_ms(),
            body_read_ms: default_body_read_ms(),
            response_ms: default_response_ms(),
            close_ms: default_close_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9001".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_buffer_size() -> usize {
    10240
}

fn default_header_read_ms() -> u64 {
    5000
}

fn default_body_read_ms() -> u64 {
    5000
}

fn default_response_ms() -> u64 {
    1000
}

fn default_close_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved timeout durations
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub header_read: Duration,
    pub body_read: Duration,
    pub response: Duration,
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        TimeoutConfig::default().into()
    }
}

impl From<TimeoutConfig> for Timeouts {
    fn from(t: TimeoutConfig) -> Self {
        Self {
            header_read: Duration::from_millis(t.header_read_ms),
            body_read: Duration::from_millis(t.body_read_ms),
            response: Duration::from_millis(t.response_ms),
            close: Duration::from_millis(t.close_ms),
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub path: String,
    pub tcp_fastopen: bool,
    pub buffer_size: usize,
    pub timeouts: Timeouts,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            path: cli.path.unwrap_or(toml_config.server.path),
            tcp_fastopen: cli.tcp_fastopen || toml_config.server.tcp_fastopen,
            buffer_size: cli.buffer_size.unwrap_or(toml_config.relay.buffer_size),
            timeouts: toml_config.timeouts.into(),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:9001");
        assert_eq!(config.server.path, "/");
        assert!(!config.server.tcp_fastopen);
        assert_eq!(config.relay.buffer_size, 10240);
        assert_eq!(config.timeouts.header_read_ms, 5000);
        assert_eq!(config.timeouts.close_ms, 1000);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9002"
            path = "/echo"
            tcp_fastopen = true

            [relay]
            buffer_size = 4096

            [timeouts]
            header_read_ms = 2000
            response_ms = 500

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9002");
        assert_eq!(config.server.path, "/echo");
        assert!(config.server.tcp_fastopen);
        assert_eq!(config.relay.buffer_size, 4096);
        assert_eq!(config.timeouts.header_read_ms, 2000);
        assert_eq!(config.timeouts.response_ms, 500);
        // Unspecified timeouts keep their defaults
        assert_eq!(config.timeouts.body_read_ms, 5000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_timeout_resolution() {
        let timeouts: Timeouts = TimeoutConfig::default().into();
        assert_eq!(timeouts.header_read, Duration::from_secs(5));
        assert_eq!(timeouts.body_read, Duration::from_secs(5));
        assert_eq!(timeouts.response, Duration::from_secs(1));
        assert_eq!(timeouts.close, Duration::from_secs(1));
    }
}
