use sqlx::{Pool, Postgres};
use std::{future::Future, time::Duration};

use crate::error::Result;

pub type DbPool = Pool<Postgres>;

const READ_RETRY_ATTEMPTS: u32 = 3;
const READ_RETRY_BACKOFF_MS: u64 = 25;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> std::result::Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Run a read with bounded retries on transient store failures.
///
/// Never wrap an append in this: a write that failed after reaching the
/// store could be applied twice.
pub async fn retry_read<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "read succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < READ_RETRY_ATTEMPTS => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = READ_RETRY_ATTEMPTS,
                    error = %e,
                    "transient read failure, retrying"
                );
                let backoff = READ_RETRY_BACKOFF_MS * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_read_recovers_from_transient_failure() {
        let calls = &AtomicU32::new(0);
        let value = retry_read("test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_read_gives_up_after_bounded_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_read("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), READ_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_read_does_not_retry_authorization_errors() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_read("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Unauthorized("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
