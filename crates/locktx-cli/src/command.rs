//! Subcommand implementations

use std::time::Duration;

use sea_orm::{ConnectionTrait, DbErr};
use tracing::info;

use locktx_common::{LockTxError, distinct};
use locktx_persistence::{
    CancelSignal, TransactionCoordinator, TransactionError, TxOption, lock_key,
    with_advisory_lock, with_cancel_signal, with_lock_timeout,
};

/// Lock keys for each distinct name, in first-seen order
pub fn lock_keys(names: &[String]) -> Vec<(String, i64)> {
    distinct(names)
        .into_iter()
        .map(|name| {
            let key = lock_key(&name);
            (name, key)
        })
        .collect()
}

/// Execute `statements` in one coordinated transaction
///
/// Returns the rows affected by each statement.
pub async fn exec(
    coordinator: &TransactionCoordinator,
    locks: &[String],
    lock_timeout: Option<u8>,
    statements: Vec<String>,
    cancel: &CancelSignal,
) -> Result<Vec<u64>, LockTxError> {
    if statements.iter().any(|sql| sql.trim().is_empty()) {
        return Err(LockTxError::IllegalArgument(
            "SQL statements must not be empty".to_string(),
        ));
    }

    coordinator
        .run(
            move |txn| {
                Box::pin(async move {
                    let mut affected = Vec::with_capacity(statements.len());
                    for sql in &statements {
                        affected.push(txn.execute_unprepared(sql).await?.rows_affected());
                    }
                    Ok::<_, DbErr>(affected)
                })
            },
            tx_options(locks, lock_timeout, cancel),
        )
        .await
        .map_err(into_locktx_error)
}

/// Acquire `locks` and keep them for `seconds`, then commit
pub async fn hold(
    coordinator: &TransactionCoordinator,
    locks: &[String],
    seconds: u64,
    lock_timeout: Option<u8>,
    cancel: &CancelSignal,
) -> Result<(), LockTxError> {
    let names = locks.join(",");
    coordinator
        .run(
            move |_| {
                Box::pin(async move {
                    info!(locks = %names, seconds, "Locks acquired, holding");
                    tokio::time::sleep(Duration::from_secs(seconds)).await;
                    Ok::<_, DbErr>(())
                })
            },
            tx_options(locks, lock_timeout, cancel),
        )
        .await
        .map_err(into_locktx_error)
}

fn tx_options(locks: &[String], lock_timeout: Option<u8>, cancel: &CancelSignal) -> Vec<TxOption> {
    let mut options: Vec<TxOption> = locks.iter().cloned().map(with_advisory_lock).collect();
    if let Some(secs) = lock_timeout {
        options.push(with_lock_timeout(secs));
    }
    options.push(with_cancel_signal(cancel.clone()));
    options
}

fn into_locktx_error(err: TransactionError<DbErr>) -> LockTxError {
    if err.is_lock_timeout() {
        return LockTxError::LockContention(err.lock_name().unwrap_or_default().to_string());
    }
    if err.is_cancelled() {
        return LockTxError::Cancelled;
    }
    LockTxError::DatabaseError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, RuntimeErr};

    fn exec_result(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[test]
    fn test_lock_keys_dedup() {
        let names = vec!["test1".to_string(), "test2".to_string(), "test1".to_string()];
        assert_eq!(
            lock_keys(&names),
            vec![
                ("test1".to_string(), -4578387130389545126),
                ("test2".to_string(), -4578387130389545127),
            ]
        );
    }

    #[tokio::test]
    async fn test_exec_reports_rows_affected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(1), exec_result(1), exec_result(3)])
            .into_connection();
        let coordinator = TransactionCoordinator::new(db);

        let affected = exec(
            &coordinator,
            &["orders".to_string()],
            None,
            vec!["DELETE FROM a".to_string(), "DELETE FROM b".to_string()],
            &CancelSignal::new(),
        )
        .await
        .unwrap();

        assert_eq!(affected, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_exec_maps_lock_timeout_to_contention() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(0)])
            .append_exec_errors([DbErr::Exec(RuntimeErr::Internal(
                "canceling statement due to lock timeout".to_string(),
            ))])
            .into_connection();
        let coordinator = TransactionCoordinator::new(db);

        let err = exec(
            &coordinator,
            &["orders".to_string()],
            Some(1),
            vec!["DELETE FROM a".to_string()],
            &CancelSignal::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LockTxError::LockContention(ref lock) if lock == "orders"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_exec_rejects_blank_statement() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let coordinator = TransactionCoordinator::new(db);

        let err = exec(
            &coordinator,
            &[],
            None,
            vec!["SELECT 1".to_string(), "  ".to_string()],
            &CancelSignal::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LockTxError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_hold_cancelled() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(0)])
            .into_connection();
        let coordinator = TransactionCoordinator::new(db);
        let cancel = CancelSignal::new();
        cancel.cancel();

        let err = hold(&coordinator, &["jobs".to_string()], 60, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LockTxError::Cancelled));
    }

    #[test]
    fn test_other_errors_become_database_errors() {
        let err = into_locktx_error(TransactionError::CommitFailed(DbErr::Custom(
            "gone".to_string(),
        )));
        assert!(matches!(err, LockTxError::DatabaseError(ref msg) if msg.contains("commit")));
    }
}
