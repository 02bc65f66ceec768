//! Configuration module for the gopher server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the gopher server
#[derive(Parser, Debug)]
#[command(name = "gopher-server")]
#[command(author = "gopher-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal Gopher server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to and advertise in listings
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to and advertise in listings
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to serve (defaults to `sample` next to the executable)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Maximum number of concurrently served connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Deadline in seconds for receiving the selector and for each
    /// 64 KiB of response written (0 = no deadline)
    #[arg(long)]
    pub timeout: Option<u64>,

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
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory to serve
    pub directory: Option<PathBuf>,
    /// Maximum number of concurrently served connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Read and per-write deadline in seconds
    #[serde(default)]
    pub timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            directory: None,
            max_connections: default_max_connections(),
            timeout: 0,
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

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_max_connections() -> usize {
    10000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `sample` directory next to the running executable
fn default_directory() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(ConfigError::Executable)?;
    let dir = exe.parent().map(PathBuf::from).unwrap_or_default();
    Ok(dir.join("sample"))
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub directory: PathBuf,
    pub max_connections: usize,
    pub timeout: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values, falling back to defaults.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let directory = match cli.directory.or(toml_config.server.directory) {
            Some(dir) => dir,
            None => default_directory()?,
        };

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            directory,
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            timeout: cli.timeout.unwrap_or(toml_config.server.timeout),
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
    Executable(std::io::Error),
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
            ConfigError::Executable(e) => {
                write!(f, "Failed to locate executable for default directory: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
