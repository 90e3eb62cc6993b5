//! Transaction coordinator
//!
//! Runs a unit of work inside a database transaction that holds a set of
//! advisory locks:
//!
//! 1. begin
//! 2. `SET LOCAL lock_timeout` when a timeout is configured
//! 3. acquire every distinct lock, sequentially, in request order
//! 4. run the unit of work
//! 5. commit, or roll back if the work failed
//!
//! Advisory locks are transaction-scoped, so they are released exactly once,
//! by whichever of commit or rollback ends the transaction. If the work
//! panics or the returned future is dropped, the `DatabaseTransaction` is
//! dropped unfinished and sea-orm rolls it back on drop.
//!
//! # Nesting
//!
//! A unit of work may call [`run_in_transaction`] again with its own
//! `&DatabaseTransaction`. The nested call shares the physical connection
//! and the outer transaction. sea-orm turns the nested begin/commit/rollback
//! into savepoint statements, so a failed inner scope only discards its own
//! statements and the outer scope can still commit.
//!
//! Locks taken by a nested scope that succeeds stay held until the outermost
//! scope ends. `ROLLBACK TO SAVEPOINT` releases the locks a failed nested
//! scope took, except those the enclosing scope already held.
//!
//! Commit and rollback are never raced against the cancel signal. Only the
//! steps up to and including the unit of work are cancellable.

use std::future::Future;
use std::pin::Pin;

use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::error::{TransactionError, TxPhase};
use crate::lock::acquire_advisory_locks;
use crate::options::{TransactionOptions, TxOption, with_lock_timeout};

/// Boxed future returned by a unit of work
pub type WorkFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Await `fut`, or `None` if `cancel` fires first
async fn guarded<F>(cancel: Option<&CancelSignal>, fut: F) -> Option<F::Output>
where
    F: Future,
{
    match cancel {
        None => Some(fut.await),
        Some(signal) => signal.run_until_cancelled(fut).await,
    }
}

/// Run `work` in a transaction holding the configured advisory locks
///
/// `db` is anything that can begin a transaction: a `DatabaseConnection`
/// pool, or a `DatabaseTransaction` for nested calls.
///
/// Lock names are deduplicated and acquired one at a time in the order the
/// options list them. Transactions that request overlapping lock sets in
/// different orders can deadlock; keeping a consistent order across call
/// sites is the caller's responsibility.
///
/// Nothing is retried. A [`TransactionError::LockAcquisitionTimeout`] means
/// another transaction held a lock longer than the configured timeout.
///
/// ```no_run
/// use locktx_persistence::{run_in_transaction, with_advisory_lock, with_lock_timeout};
/// use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
///
/// async fn bump(db: &DatabaseConnection) -> Result<(), Box<dyn std::error::Error>> {
///     run_in_transaction(
///         db,
///         |txn| {
///             Box::pin(async move {
///                 txn.execute_unprepared("UPDATE counters SET n = n + 1").await?;
///                 Ok::<_, DbErr>(())
///             })
///         },
///         [with_advisory_lock("counters"), with_lock_timeout(5)],
///     )
///     .await?;
///     Ok(())
/// }
/// ```
pub async fn run_in_transaction<C, F, T, E, I>(
    db: &C,
    work: F,
    options: I,
) -> Result<T, TransactionError<E>>
where
    C: TransactionTrait,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> WorkFuture<'c, T, E> + Send,
    E: std::error::Error + Send + 'static,
    I: IntoIterator<Item = TxOption>,
{
    let options = TransactionOptions::from_options(options);
    let cancel = options.cancel();

    let txn = match guarded(cancel, db.begin()).await {
        Some(Ok(txn)) => txn,
        Some(Err(err)) => return Err(TransactionError::BeginFailed(err)),
        None => return Err(TransactionError::Cancelled(TxPhase::Begin)),
    };

    if let Some(secs) = options.lock_timeout_secs() {
        debug!(timeout_secs = secs, "Setting local lock timeout");
        let sql = format!("SET LOCAL lock_timeout = '{}s'", secs);
        match guarded(cancel, txn.execute_unprepared(&sql)).await {
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                abandon(txn).await;
                return Err(TransactionError::TimeoutConfigFailed(err));
            }
            None => return Err(TransactionError::Cancelled(TxPhase::LockTimeout)),
        }
    }

    match guarded(cancel, acquire_advisory_locks(&txn, options.locks())).await {
        Some(Ok(())) => {}
        Some(Err(err)) => {
            let err = TransactionError::from_lock_error(err);
            if err.is_lock_timeout() {
                warn!(lock = ?err.lock_name(), "Advisory lock wait timed out");
            }
            abandon(txn).await;
            return Err(err);
        }
        None => return Err(TransactionError::Cancelled(TxPhase::LockAcquisition)),
    }

    let outcome = guarded(cancel, work(&txn)).await;
    let work_err = match outcome {
        Some(Ok(value)) => {
            // Terminal statements are not raced against the cancel signal
            return match txn.commit().await {
                Ok(()) => {
                    debug!("Transaction committed");
                    Ok(value)
                }
                Err(err) => Err(TransactionError::CommitFailed(err)),
            };
        }
        Some(Err(err)) => err,
        None => return Err(TransactionError::Cancelled(TxPhase::Work)),
    };

    debug!(error = %work_err, "Unit of work failed, rolling back");
    match txn.rollback().await {
        Ok(()) => Err(TransactionError::WorkFailed(work_err)),
        Err(err) => {
            warn!(error = %err, "Rollback after failed unit of work failed");
            Err(TransactionError::RollbackFailed {
                source: err,
                work: work_err,
            })
        }
    }
}

/// Roll back a transaction that failed before the unit of work ran
///
/// The caller already has the error to report; a rollback failure here is
/// only logged, the connection is discarded by the pool either way.
async fn abandon(txn: DatabaseTransaction) {
    if let Err(err) = txn.rollback().await {
        warn!(error = %err, "Failed to roll back abandoned transaction");
    }
}

/// Coordinator bound to a connection pool with default options
///
/// Defaults are applied before the per-call options, so a per-call
/// `with_lock_timeout` overrides the default timeout.
#[derive(Debug)]
pub struct TransactionCoordinator {
    db: DatabaseConnection,
    default_lock_timeout_secs: u8,
}

impl TransactionCoordinator {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            default_lock_timeout_secs: 0,
        }
    }

    /// Default lock timeout for every transaction; `0` disables it
    pub fn with_default_lock_timeout(mut self, seconds: u8) -> Self {
        self.default_lock_timeout_secs = seconds;
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Run `work` in a new coordinated transaction on the pool
    pub async fn run<F, T, E, I>(&self, work: F, options: I) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> WorkFuture<'c, T, E> + Send,
        E: std::error::Error + Send + 'static,
        I: IntoIterator<Item = TxOption>,
    {
        let defaults = (self.default_lock_timeout_secs > 0)
            .then(|| with_lock_timeout(self.default_lock_timeout_secs));
        run_in_transaction(&self.db, work, defaults.into_iter().chain(options)).await
    }
}
