//! Error types for locktx
//!
//! This module defines:
//! - `LockTxError`: Application-level error enum used by the command-line tool
//! - `AppError`: Wrapper around `anyhow::Error` for the binary boundary

use std::fmt::{Display, Formatter};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum LockTxError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("lock '{0}' is held by another transaction")]
    LockContention(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl LockTxError {
    /// Whether a caller may reasonably retry the operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockTxError::LockContention(_))
    }
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<LockTxError> for AppError {
    fn from(value: LockTxError) -> Self {
        AppError {
            inner: anyhow::Error::new(value),
        }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Whether this error was caused by lock contention anywhere in its chain
    pub fn is_lock_contention(&self) -> bool {
        self.inner
            .chain()
            .filter_map(|cause| cause.downcast_ref::<LockTxError>())
            .any(LockTxError::is_retryable)
    }
}
