//! Logging setup for the locktx command-line tool.
//!
//! | Log File    | Contents                                   | Target Prefixes      |
//! |-------------|--------------------------------------------|----------------------|
//! | locktx.log  | Root logger (all components)               | (all)                |
//! | locks.log   | Transaction, lock and timeout decisions    | locktx_persistence   |
//!
//! Console output goes to stderr so command results on stdout stay
//! machine-readable. File logging is off unless `log.file` is enabled; log
//! files land in `~/locktx/logs` unless `log.dir` says otherwise.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const ROOT_LOG_FILE: &str = "locktx.log";
const LOCK_LOG_FILE: &str = "locks.log";
const LOCK_LOG_TARGETS: &[&str] = &["locktx_persistence"];

/// Log file rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation '{}'", other)),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(value: LogRotation) -> Self {
        match value {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the tool.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log directory (default: `~/locktx/logs`)
    pub log_dir: PathBuf,
    /// Enable console output on stderr
    pub console_output: bool,
    /// Enable file logging
    pub file_logging: bool,
    pub level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/locktx/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::WARN,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration values.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: &str,
        rotation: &str,
    ) -> Self {
        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            file_logging,
            level: level.parse().unwrap_or(Level::WARN),
            rotation: rotation.parse().unwrap_or_default(),
        }
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes them.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level for the console and root file.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        layers.push(Box::new(
            fmt::layer()
                .with_writer(root_nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(root_filter),
        ));

        // locks.log records every phase of every coordinated transaction
        let lock_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, LOCK_LOG_FILE);
        let (lock_nb, lock_guard) = tracing_appender::non_blocking(lock_appender);
        guards.push(lock_guard);

        let mut targets = Targets::new();
        for target in LOCK_LOG_TARGETS {
            targets = targets.with_target(*target, LevelFilter::DEBUG);
        }
        layers.push(Box::new(
            fmt::layer()
                .with_writer(lock_nb)
                .with_target(true)
                .with_ansi(false)
                .with_filter(targets),
        ));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::debug!(log_dir = %config.log_dir.display(), "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_parse() {
        assert_eq!("daily".parse::<LogRotation>(), Ok(LogRotation::Daily));
        assert_eq!("HOURLY".parse::<LogRotation>(), Ok(LogRotation::Hourly));
        assert_eq!("never".parse::<LogRotation>(), Ok(LogRotation::Never));
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_from_config_falls_back_on_bad_values() {
        let config = LoggingConfig::from_config(None, true, false, "loud", "weekly");
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.rotation, LogRotation::Daily);
        assert!(config.log_dir.ends_with("locktx/logs"));
    }

    #[test]
    fn test_from_config_uses_given_values() {
        let config = LoggingConfig::from_config(
            Some("/var/log/locktx".to_string()),
            false,
            true,
            "debug",
            "hourly",
        );
        assert_eq!(config.log_dir, PathBuf::from("/var/log/locktx"));
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert!(config.file_logging);
        assert!(!config.console_output);
    }
}
