//! locktx Persistence - Transaction-scoped advisory lock coordination
//!
//! This crate provides:
//! - Lock name hashing and sequential `pg_advisory_xact_lock` acquisition
//! - Composable per-transaction options (locks, local lock timeout, cancellation)
//! - The transaction coordinator: begin, lock, run work, commit or roll back
//! - A phase-tagged error taxonomy with central lock-timeout detection

pub mod cancel;
pub mod error;
pub mod lock;
pub mod options;
pub mod transaction;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use cancel::CancelSignal;
pub use error::{TransactionError, TxPhase, is_lock_timeout_error};
pub use lock::{LockError, acquire_advisory_locks, lock_key};
pub use options::{
    TransactionOptions, TxOption, with_advisory_lock, with_cancel_signal, with_lock_timeout,
};
pub use transaction::{TransactionCoordinator, WorkFuture, run_in_transaction};
