//! Transaction error taxonomy
//!
//! Every variant names the phase that failed and keeps the underlying error
//! reachable through [`std::error::Error::source`]. Driver errors are
//! inspected in exactly one place, [`is_lock_timeout_error`].

use std::fmt;

use sea_orm::{DbErr, RuntimeErr};

use crate::lock::LockError;

/// SQLSTATE `lock_not_available`, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";
const LOCK_TIMEOUT_MESSAGE: &str = "canceling statement due to lock timeout";

/// Step of a coordinated transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPhase {
    Begin,
    LockTimeout,
    LockAcquisition,
    Work,
    Rollback,
    Commit,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxPhase::Begin => "begin",
            TxPhase::LockTimeout => "lock timeout setup",
            TxPhase::LockAcquisition => "lock acquisition",
            TxPhase::Work => "unit of work",
            TxPhase::Rollback => "rollback",
            TxPhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Error returned by [`run_in_transaction`](crate::transaction::run_in_transaction)
///
/// `E` is the error type of the unit of work.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError<E> {
    /// The transaction could not be opened; the driver error is passed through as-is
    #[error(transparent)]
    BeginFailed(DbErr),

    #[error("failed to set local lock timeout: {0}")]
    TimeoutConfigFailed(#[source] DbErr),

    /// A lock wait was aborted by `lock_timeout`; callers decide whether to retry
    #[error("could not acquire database lock '{}': lock timeout", .0.lock)]
    LockAcquisitionTimeout(#[source] LockError),

    #[error(transparent)]
    LockAcquisitionFailed(LockError),

    /// The unit of work failed and the transaction was rolled back
    #[error("transaction rollback: {0}")]
    WorkFailed(#[source] E),

    /// Rollback after a failed unit of work failed too; the outcome is unknown
    #[error("failed to roll back transaction: {source}")]
    RollbackFailed {
        #[source]
        source: DbErr,
        work: E,
    },

    #[error("failed to commit transaction: {0}")]
    CommitFailed(#[source] DbErr),

    /// The attached cancel signal fired; the transaction was abandoned
    #[error("transaction cancelled during {0}")]
    Cancelled(TxPhase),
}

impl<E> TransactionError<E> {
    /// Phase that produced the error
    pub fn phase(&self) -> TxPhase {
        match self {
            TransactionError::BeginFailed(_) => TxPhase::Begin,
            TransactionError::TimeoutConfigFailed(_) => TxPhase::LockTimeout,
            TransactionError::LockAcquisitionTimeout(_)
            | TransactionError::LockAcquisitionFailed(_) => TxPhase::LockAcquisition,
            TransactionError::WorkFailed(_) => TxPhase::Work,
            TransactionError::RollbackFailed { .. } => TxPhase::Rollback,
            TransactionError::CommitFailed(_) => TxPhase::Commit,
            TransactionError::Cancelled(phase) => *phase,
        }
    }

    /// Whether a lock could not be acquired before `lock_timeout` expired
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, TransactionError::LockAcquisitionTimeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransactionError::Cancelled(_))
    }

    /// Name of the lock involved in a lock acquisition failure
    pub fn lock_name(&self) -> Option<&str> {
        match self {
            TransactionError::LockAcquisitionTimeout(err)
            | TransactionError::LockAcquisitionFailed(err) => Some(&err.lock),
            _ => None,
        }
    }

    /// Error returned by the unit of work, if it failed
    pub fn work_error(&self) -> Option<&E> {
        match self {
            TransactionError::WorkFailed(work) | TransactionError::RollbackFailed { work, .. } => {
                Some(work)
            }
            _ => None,
        }
    }

    pub fn into_work_error(self) -> Option<E> {
        match self {
            TransactionError::WorkFailed(work) | TransactionError::RollbackFailed { work, .. } => {
                Some(work)
            }
            _ => None,
        }
    }

    /// Map a lock acquisition failure to its timeout or generic variant
    pub(crate) fn from_lock_error(err: LockError) -> Self {
        if is_lock_timeout_error(&err.source) {
            TransactionError::LockAcquisitionTimeout(err)
        } else {
            TransactionError::LockAcquisitionFailed(err)
        }
    }
}

/// Whether a driver error is PostgreSQL aborting a lock wait on `lock_timeout`
pub fn is_lock_timeout_error(err: &DbErr) -> bool {
    if let DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Query(RuntimeErr::SqlxError(sqlx_err)) = err
        && let Some(db_err) = sqlx_err.as_database_error()
        && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    {
        return true;
    }

    let message = err.to_string();
    message.contains(LOCK_TIMEOUT_MESSAGE) || message.contains(LOCK_NOT_AVAILABLE)
}
