//! Transaction-scoped PostgreSQL advisory locks
//!
//! Lock names are mapped to the signed 64-bit key space of
//! `pg_advisory_xact_lock` with FNV-1, so every process (and every other
//! FNV-1 based client) derives the same key for the same name.
//!
//! Locks are acquired one at a time, in the order requested. That fixed
//! ordering is the only deadlock protection: transactions that share lock
//! names must request them in a compatible order.

use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};
use tracing::debug;

use locktx_common::distinct;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const ADVISORY_XACT_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

/// Map a lock name to its advisory lock key (FNV-1, 64 bit)
///
/// ```
/// use locktx_persistence::lock_key;
///
/// assert_eq!(lock_key("test1"), -4578387130389545126);
/// assert_eq!(lock_key("test1"), lock_key("test1"));
/// ```
pub const fn lock_key(name: &str) -> i64 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash = hash.wrapping_mul(FNV_PRIME);
        hash ^= bytes[i] as u64;
        i += 1;
    }
    hash as i64
}

/// Failure to acquire one advisory lock
#[derive(Debug, thiserror::Error)]
#[error("could not acquire database advisory lock '{lock}' (key {key}): {source}")]
pub struct LockError {
    /// Name of the lock that failed
    pub lock: String,
    /// Key the name hashed to
    pub key: i64,
    #[source]
    pub source: DbErr,
}

/// Acquire a transaction-scoped advisory lock for every distinct name
///
/// `conn` must be a transaction (e.g. `DatabaseTransaction`); on a plain
/// pooled connection each statement runs in its own implicit transaction and
/// the lock is released immediately.
///
/// Names are deduplicated first (first occurrence wins) and then locked
/// sequentially in list order. Each request blocks until PostgreSQL grants
/// the lock, the statement hits `lock_timeout`, or the future is dropped.
/// The first failure is returned; locks already taken stay held until the
/// surrounding transaction ends.
pub async fn acquire_advisory_locks<C>(conn: &C, names: &[String]) -> Result<(), LockError>
where
    C: ConnectionTrait,
{
    let names = distinct(names);
    if names.is_empty() {
        return Ok(());
    }

    let backend = conn.get_database_backend();
    for name in names {
        let key = lock_key(&name);
        if backend != DbBackend::Postgres {
            return Err(LockError {
                lock: name,
                key,
                source: DbErr::Custom(format!(
                    "advisory locks require PostgreSQL, connection backend is {:?}",
                    backend
                )),
            });
        }

        debug!(lock = %name, key, "Acquiring advisory lock");
        let stmt = Statement::from_sql_and_values(backend, ADVISORY_XACT_LOCK_SQL, [key.into()]);
        if let Err(source) = conn.execute(stmt).await {
            return Err(LockError {
                lock: name,
                key,
                source,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};

    fn lock_stmt(name: &str) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Postgres,
            ADVISORY_XACT_LOCK_SQL,
            [lock_key(name).into()],
        )
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[test]
    fn test_lock_key_known_values() {
        assert_eq!(lock_key("test1"), -4578387130389545126);
        assert_eq!(lock_key("test2"), -4578387130389545127);
        assert_eq!(lock_key(""), FNV_OFFSET_BASIS as i64);
    }

    #[test]
    fn test_lock_key_is_usable_in_const_context() {
        const KEY: i64 = lock_key("test1");
        assert_eq!(KEY, lock_key("test1"));
    }

    #[tokio::test]
    async fn test_acquire_in_order() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(), exec_ok()])
            .into_connection();

        let names = vec!["test1".to_string(), "test2".to_string()];
        acquire_advisory_locks(&db, &names).await.unwrap();

        assert_eq!(
            db.into_transaction_log(),
            [
                Transaction::one(lock_stmt("test1")),
                Transaction::one(lock_stmt("test2")),
            ]
        );
    }

    #[tokio::test]
    async fn test_acquire_skips_duplicates() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(), exec_ok()])
            .into_connection();

        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        acquire_advisory_locks(&db, &names).await.unwrap();

        assert_eq!(
            db.into_transaction_log(),
            [Transaction::one(lock_stmt("b")), Transaction::one(lock_stmt("a"))]
        );
    }

    #[tokio::test]
    async fn test_acquire_nothing_issues_no_statement() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        acquire_advisory_locks(&db, &[]).await.unwrap();
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_loop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Custom("some error".to_string())])
            .append_exec_results([exec_ok()])
            .into_connection();

        let names = vec!["test1".to_string(), "test2".to_string()];
        let err = acquire_advisory_locks(&db, &names).await.unwrap_err();

        assert_eq!(err.lock, "test1");
        assert_eq!(err.key, lock_key("test1"));
        assert!(matches!(err.source, DbErr::Custom(ref msg) if msg == "some error"));
        assert_eq!(
            db.into_transaction_log(),
            [Transaction::one(lock_stmt("test1"))]
        );
    }

    #[tokio::test]
    async fn test_non_postgres_backend_rejected() {
        let db = MockDatabase::new(DatabaseBackend::MySql).into_connection();
        let err = acquire_advisory_locks(&db, &["a".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("require PostgreSQL"));
        assert!(db.into_transaction_log().is_empty());
    }

    proptest! {
        #[test]
        fn prop_lock_key_is_deterministic(name in ".*") {
            prop_assert_eq!(lock_key(&name), lock_key(&name.clone()));
        }
    }
}
