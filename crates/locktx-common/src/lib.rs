//! locktx Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all locktx components:
//! - Application error type
//! - Collection utilities (order-preserving deduplication)
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{AppError, LockTxError};
pub use utils::distinct;

/// Process exit code reported when a lock could not be acquired in time
pub const EXIT_LOCK_CONTENTION: i32 = 2;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "conf/locktx.yml";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "LOCKTX";
