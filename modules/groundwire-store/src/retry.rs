//! Retry policy for database calls: transient failures back off
//! geometrically, duplicate-key conflicts are swallowed as empty success,
//! anything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use groundwire_common::CancelFlag;

use crate::error::StoreError;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
const BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    DuplicateKey,
    Fatal,
}

/// Behavioral classification: duplicate keys by SQLSTATE, transient
/// failures by error text, matching the gateway's error taxonomy.
pub fn classify(err: &sqlx::Error) -> RetryClass {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return RetryClass::DuplicateKey;
        }
    }

    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            RetryClass::Transient
        }
        other => {
            let text = other.to_string().to_lowercase();
            if text.contains("server disconnected")
                || text.contains("connection")
                || text.contains("timeout")
                || text.contains("timed out")
            {
                RetryClass::Transient
            } else {
                RetryClass::Fatal
            }
        }
    }
}

/// Run `op` with bounded geometric back-off (1s × 2^attempt). Returns
/// `Ok(None)` when the operation hit a duplicate-key conflict, `Ok(Some)`
/// on success. Cancellation is checked before each attempt.
pub async fn with_retry<T, F, Fut>(
    op_name: &str,
    cancel: &CancelFlag,
    max_retries: u32,
    mut op: F,
) -> Result<Option<T>, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let max_retries = max_retries.max(1);
    let mut last_err = None;

    for attempt in 0..max_retries {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) => match classify(&e) {
                RetryClass::DuplicateKey => {
                    // The data already exists; treat as success with no rows.
                    return Ok(None);
                }
                RetryClass::Transient if attempt + 1 < max_retries => {
                    let delay = BASE_DELAY * 2u32.saturating_pow(attempt);
                    warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        max = max_retries,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "transient database error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(e);
                }
                RetryClass::Transient => {
                    return Err(StoreError::RetriesExhausted {
                        op: op_name.to_string(),
                        attempts: max_retries,
                        source: e,
                    });
                }
                RetryClass::Fatal => return Err(StoreError::Database(e)),
            },
        }
    }

    Err(StoreError::RetriesExhausted {
        op: op_name.to_string(),
        attempts: max_retries,
        source: last_err.unwrap_or(sqlx::Error::PoolClosed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn io_errors_are_transient() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "server disconnected",
        ));
        assert_eq!(classify(&err), RetryClass::Transient);
    }

    #[test]
    fn row_not_found_is_fatal() {
        assert_eq!(classify(&sqlx::Error::RowNotFound), RetryClass::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let cancel = CancelFlag::new();

        let result = with_retry("test op", &cancel, 5, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, Some(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result =
            with_retry("test op", &cancel, 5, || async { Ok::<_, sqlx::Error>(1u32) }).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let attempts = AtomicU32::new(0);
        let cancel = CancelFlag::new();

        let result = with_retry("test op", &cancel, 5, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
