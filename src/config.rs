//! Configuration module for the line-lookup server.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments (or their environment variables) take
//! precedence over config file values.

use crate::bench::{BenchPlan, BenchTarget};
use crate::pool::DEFAULT_WORKERS;
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the lookup server
#[derive(Parser, Debug)]
#[command(name = "line-lookup")]
#[command(author = "line-lookup authors")]
#[command(version = "0.1.0")]
#[command(about = "Answers whether a query appears as a full line of a dataset", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "HOST", global = true)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT", global = true)]
    pub port: Option<u16>,

    /// Path to the dataset file
    #[arg(short, long, global = true)]
    pub dataset: Option<PathBuf>,

    /// Reread the dataset from disk on every query instead of caching it
    #[arg(
        long,
        env = "REREAD_ON_QUERY",
        global = true,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub reread_on_query: Option<bool>,

    /// Number of workers scanning the cached dataset
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Wrap connections in TLS
    #[arg(long, global = true)]
    pub tls: bool,

    /// PEM certificate chain for TLS
    #[arg(long, global = true)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key for TLS
    #[arg(long, global = true)]
    pub key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to run
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve lookups (the default)
    Serve,
    /// Time the search algorithms or a running server
    Bench(BenchArgs),
}

/// Benchmark options
#[derive(Args, Debug, Clone, PartialEq)]
pub struct BenchArgs {
    /// Dataset sizes (line counts) to test
    #[arg(long, value_delimiter = ',', default_values_t = [10_000, 50_000, 100_000, 500_000, 1_000_000])]
    pub sizes: Vec<usize>,

    /// Query counts per measurement
    #[arg(long, value_delimiter = ',', default_values_t = [1, 5, 10, 50, 100])]
    pub queries: Vec<usize>,

    /// Repetitions averaged per configuration
    #[arg(long, default_value_t = 5)]
    pub runs: usize,

    /// What to measure
    #[arg(long, value_enum, default_value_t = BenchTarget::Memory)]
    pub target: BenchTarget,

    /// Sort each slice before searching
    #[arg(long)]
    pub sorted: bool,
}

impl From<BenchArgs> for BenchPlan {
    fn from(args: BenchArgs) -> Self {
        BenchPlan {
            sizes: args.sizes,
            query_counts: args.queries,
            runs: args.runs,
            target: args.target,
            sorted: args.sorted,
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub tls: TlsConfig,
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
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Dataset-related configuration
#[derive(Debug, Deserialize)]
pub struct DatasetConfig {
    #[serde(alias = "linuxpath")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub reread_on_query: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            reread_on_query: false,
            workers: default_workers(),
        }
    }
}

/// TLS configuration
#[derive(Debug, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default, alias = "use_ssl")]
    pub enabled: bool,
    #[serde(alias = "certfile")]
    pub cert_file: Option<PathBuf>,
    #[serde(alias = "keyfile")]
    pub key_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
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
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    44445
}

fn default_max_connections() -> usize {
    10_000
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Certificate and key for TLS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub dataset: PathBuf,
    pub reread_on_query: bool,
    pub workers: usize,
    pub tls: Option<TlsFiles>,
    pub log_level: String,
    pub command: Command,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let dataset = cli
            .dataset
            .or(toml_config.dataset.path)
            .ok_or(ConfigError::MissingDataset)?;

        let workers = cli.workers.unwrap_or(toml_config.dataset.workers);
        if workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        let max_connections = toml_config.server.max_connections;
        if max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }

        let tls = if cli.tls || toml_config.tls.enabled {
            let cert_file = cli.cert_file.or(toml_config.tls.cert_file);
            let key_file = cli.key_file.or(toml_config.tls.key_file);
            match (cert_file, key_file) {
                (Some(cert_file), Some(key_file)) => Some(TlsFiles {
                    cert_file,
                    key_file,
                }),
                _ => return Err(ConfigError::MissingTlsFiles),
            }
        } else {
            None
        };

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            max_connections,
            dataset,
            reread_on_query: cli
                .reread_on_query
                .unwrap_or(toml_config.dataset.reread_on_query),
            workers,
            tls,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            command: cli.command.unwrap_or(Command::Serve),
        })
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingDataset,
    ZeroWorkers,
    ZeroConnections,
    MissingTlsFiles,
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
            ConfigError::MissingDataset => {
                write!(f, "No dataset path configured (use --dataset or [dataset] path)")
            }
            ConfigError::ZeroWorkers => write!(f, "Worker count must be at least 1"),
            ConfigError::ZeroConnections => {
                write!(f, "Connection limit (max_connections) must be at least 1")
            }
            ConfigError::MissingTlsFiles => {
                write!(f, "TLS is enabled but the certificate or key file is not set")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
