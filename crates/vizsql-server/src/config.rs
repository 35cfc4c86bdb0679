//! Configuration system for the vizsql server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, database, compilation, logging)
//! 2. .env file - deployment overrides
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use vizsql_compile::{CompileOptions, LiteralQuoting, DEFAULT_SAMPLE_LIMIT};
use vizsql_registry::{BucketCapability, Dialect, DialectRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Dialect {0} cannot run on DuckDB: histograms need width_bucket over arrays")]
    UnsupportedDialect(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// DuckDB file; in-memory when absent
    #[serde(default)]
    pub path: Option<String>,

    /// Table used when a request names none
    #[serde(default)]
    pub table: Option<String>,

    /// SQL dialect name, resolved through the dialect registry
    pub dialect: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: None,
            dialect: "duckdb".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Look up the configured dialect; the server only drives DuckDB
    pub fn dialect(&self, registry: &DialectRegistry) -> Result<Dialect, ConfigError> {
        let dialect = registry.lookup(&self.dialect)?;
        match dialect.bucket {
            BucketCapability::Arithmetic => Ok(dialect.clone()),
            BucketCapability::NativeWidthBucket => Err(ConfigError::UnsupportedDialect(dialect.name.clone())),
        }
    }
}

/// Query compilation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    pub sample_limit: usize,
    pub literal_quoting: LiteralQuoting,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            literal_quoting: LiteralQuoting::AlwaysString,
        }
    }
}

impl CompileConfig {
    pub fn options(&self) -> CompileOptions {
        CompileOptions {
            sample_limit: self.sample_limit,
            literal_quoting: self.literal_quoting,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub compile: CompileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `VIZSQL_*` and logging overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("VIZSQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("VIZSQL_SERVER_PORT") {
            self.server.port = parse("VIZSQL_SERVER_PORT", port)?;
        }

        if let Some(path) = lookup("VIZSQL_DATABASE") {
            self.database.path = Some(path);
        }
        if let Some(table) = lookup("VIZSQL_TABLE") {
            self.database.table = Some(table);
        }
        if let Some(dialect) = lookup("VIZSQL_DIALECT") {
            self.database.dialect = dialect;
        }

        if let Some(limit) = lookup("VIZSQL_SAMPLE_LIMIT") {
            self.compile.sample_limit = parse("VIZSQL_SAMPLE_LIMIT", limit)?;
        }
        if let Some(quoting) = lookup("VIZSQL_LITERAL_QUOTING") {
            self.compile.literal_quoting = match quoting.to_lowercase().as_str() {
                "always_string" | "string" => LiteralQuoting::AlwaysString,
                "typed" => LiteralQuoting::Typed,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "VIZSQL_LITERAL_QUOTING",
                        value: quoting,
                    })
                }
            };
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}
