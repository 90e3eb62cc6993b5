//! Configuration management for the locktx tool
//!
//! Sources, lowest precedence first: the YAML config file (optional),
//! `LOCKTX_*` environment variables (`__` separates key segments, e.g.
//! `LOCKTX_DB__URL`), then command-line overrides.

use std::time::Duration;

use clap::{Parser, Subcommand};
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use locktx_common::{DEFAULT_CONFIG_FILE, ENV_PREFIX, LockTxError};

use crate::logging::LoggingConfig;

pub const DB_URL: &str = "db.url";
pub const DB_MAX_CONNECTIONS: &str = "db.pool.max_connections";
pub const DB_MIN_CONNECTIONS: &str = "db.pool.min_connections";
pub const DB_CONNECT_TIMEOUT: &str = "db.pool.connect_timeout";
pub const DB_ACQUIRE_TIMEOUT: &str = "db.pool.acquire_timeout";
pub const DB_IDLE_TIMEOUT: &str = "db.pool.idle_timeout";
pub const DB_SQLX_LOGGING: &str = "db.pool.sqlx_logging";
pub const LOCK_TIMEOUT_SECONDS: &str = "lock.timeout_seconds";
pub const LOG_LEVEL: &str = "log.level";
pub const LOG_DIR: &str = "log.dir";
pub const LOG_CONSOLE: &str = "log.console";
pub const LOG_FILE: &str = "log.file";
pub const LOG_ROTATION: &str = "log.rotation";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    name = "locktx",
    version,
    about = "Run SQL inside PostgreSQL transactions guarded by advisory locks"
)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the advisory lock key of each name
    Key {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Execute SQL statements in one transaction holding the given locks
    Exec {
        #[arg(short = 'l', long = "lock")]
        locks: Vec<String>,
        /// Seconds to wait for each lock before giving up
        #[arg(short = 't', long = "lock-timeout")]
        lock_timeout: Option<u8>,
        #[arg(required = true)]
        statements: Vec<String>,
    },
    /// Acquire locks and hold them for a while
    Hold {
        #[arg(short = 'l', long = "lock", required = true)]
        locks: Vec<String>,
        #[arg(short = 's', long = "seconds", default_value_t = 10)]
        seconds: u64,
        #[arg(short = 't', long = "lock-timeout")]
        lock_timeout: Option<u8>,
    },
}

/// Application configuration loaded from file, environment and CLI
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> Result<Self, LockTxError> {
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&cli.config).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &cli.database_url {
            config_builder = config_builder
                .set_override(DB_URL, v.as_str())
                .map_err(|e| LockTxError::ConfigError(e.to_string()))?;
        }
        if let Some(v) = &cli.log_level {
            config_builder = config_builder
                .set_override(LOG_LEVEL, v.as_str())
                .map_err(|e| LockTxError::ConfigError(e.to_string()))?;
        }

        let config = config_builder
            .build()
            .map_err(|e| LockTxError::ConfigError(e.to_string()))?;

        Ok(Configuration { config })
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    pub fn database_url(&self) -> Result<String, LockTxError> {
        self.config.get_string(DB_URL).map_err(|_| {
            LockTxError::ConfigError(format!(
                "'{}' is not set (use --db-url or DATABASE_URL)",
                DB_URL
            ))
        })
    }

    /// Default lock timeout applied to every transaction, `0` for none
    pub fn lock_timeout_seconds(&self) -> u8 {
        self.config
            .get_int(LOCK_TIMEOUT_SECONDS)
            .map(|v| v.clamp(0, i64::from(u8::MAX)) as u8)
            .unwrap_or(0)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOG_DIR).ok(),
            self.config.get_bool(LOG_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOG_FILE).unwrap_or(false),
            &self
                .config
                .get_string(LOG_LEVEL)
                .unwrap_or_else(|_| "warn".to_string()),
            &self
                .config
                .get_string(LOG_ROTATION)
                .unwrap_or_else(|_| "daily".to_string()),
        )
    }

    pub fn connect_options(&self) -> Result<ConnectOptions, LockTxError> {
        let max_connections = self.get_u32(DB_MAX_CONNECTIONS, 10).max(1);
        let min_connections = self.get_u32(DB_MIN_CONNECTIONS, 1).min(max_connections);
        let connect_timeout = self.get_u64(DB_CONNECT_TIMEOUT, 30);
        let acquire_timeout = self.get_u64(DB_ACQUIRE_TIMEOUT, 8);
        let idle_timeout = self.get_u64(DB_IDLE_TIMEOUT, 10);
        let sqlx_logging = self.config.get_bool(DB_SQLX_LOGGING).unwrap_or(false);

        let mut opt = ConnectOptions::new(self.database_url()?);

        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .idle_timeout(Duration::from_secs(idle_timeout))
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        tracing::debug!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout = connect_timeout,
            idle_timeout = idle_timeout,
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        Ok(opt)
    }

    /// Integer value of `key` clamped into `u32`, or `default` when unset
    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.config
            .get_int(key)
            .map(|v| u32::try_from(v.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(default)
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .map(|v| u64::try_from(v).unwrap_or(0))
            .unwrap_or(default)
    }

    pub async fn database_connection(&self) -> Result<DatabaseConnection, LockTxError> {
        let opt = self.connect_options()?;
        Database::connect(opt)
            .await
            .map_err(|e| LockTxError::DatabaseError(e.to_string()))
    }
}
