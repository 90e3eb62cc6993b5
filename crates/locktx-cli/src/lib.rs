//! locktx command-line tool
//!
//! Configuration loading, logging setup and the subcommands behind the
//! `locktx` binary.

pub mod command;
pub mod config;
pub mod logging;

pub use config::{Cli, Command, Configuration};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
