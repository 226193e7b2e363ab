//! Configuration module for event-echo.
//!
//! The bind address and port are positional command-line arguments. Reactor
//! tuning and log level may also come from an optional TOML file; CLI
//! arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "event-echo")]
#[command(author = "event-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded readiness-based TCP echo server", long_about = None)]
pub struct CliArgs {
    /// IPv4 address to bind to (e.g., 127.0.0.1)
    pub host: Ipv4Addr,

    /// TCP port to listen on
    pub port: u16,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Upper bound on a single readiness wait, in milliseconds
    #[arg(long)]
    pub wait_timeout_ms: Option<u64>,

    /// Sleep while no connections are registered, in milliseconds
    #[arg(long)]
    pub idle_sleep_ms: Option<u64>,

    /// Receive buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reactor-related configuration
#[derive(Debug, Deserialize)]
pub struct ReactorConfig {
    /// Wait timeout in milliseconds
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Idle sleep in milliseconds
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    /// Receive buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
            buffer_size: default_buffer_size(),
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

fn default_wait_timeout_ms() -> u64 {
    100
}

fn default_idle_sleep_ms() -> u64 {
    100
}

fn default_buffer_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Ipv4Addr,
    pub port: u16,
    pub wait_timeout: Duration,
    pub idle_sleep: Duration,
    pub buffer_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::try_parse().map_err(ConfigError::Usage)?;
        Self::from_args(cli)
    }

    /// Merge parsed CLI args with the TOML file they point to, if any.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let buffer_size = cli
            .buffer_size
            .unwrap_or(toml_config.reactor.buffer_size);
        if buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer size must be non-zero"));
        }

        Ok(Config {
            host: cli.host,
            port: cli.port,
            wait_timeout: Duration::from_millis(
                cli.wait_timeout_ms
                    .unwrap_or(toml_config.reactor.wait_timeout_ms),
            ),
            idle_sleep: Duration::from_millis(
                cli.idle_sleep_ms
                    .unwrap_or(toml_config.reactor.idle_sleep_ms),
            ),
            buffer_size,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Usage(clap::Error),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Usage(e) => write!(f, "{e}"),
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
