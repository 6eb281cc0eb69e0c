//! Shared conflict-retry helper for reconcilers
//!
//! A write that collides with a concurrent writer comes back as `Conflict`;
//! retried a bounded number of times with a fresh attempt (get+patch) each
//! time, per the "optimistic retry over locking" design note.

use std::future::Future;

use crate::errors::NetworkingError;

const MAX_ATTEMPTS: u32 = 3;

/// Run `attempt` up to `MAX_ATTEMPTS` times, retrying only on
/// `NetworkingError::is_retryable()`. Each call to `attempt` should perform
/// its own fresh read before writing, so a retry sees the latest state.
pub async fn apply_with_retry<T, F, Fut>(mut attempt: F) -> Result<T, NetworkingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetworkingError>>,
{
    let mut last_err = None;
    for _ in 0..MAX_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<u32, NetworkingError> = apply_with_retry(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_conflict_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = apply_with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(NetworkingError::Conflict("retry me".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let result: Result<u32, NetworkingError> =
            apply_with_retry(|| async { Err(NetworkingError::Conflict("always".to_string())) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, NetworkingError> = apply_with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(NetworkingError::BadSpec("nope".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
