//! Per-attempt timeouts.

use std::future::Future;
use std::time::Duration;

use super::error::TimeoutError;

/// Bound a single attempt by `duration`.
///
/// The runner never interrupts an attempt on its own; wrap the work future in
/// `with_timeout` so a hung call turns into a retryable
/// [`TimeoutError::Timeout`] instead of stalling the run.
///
/// # Example
///
/// ```rust
/// use resync::retry::with_timeout;
/// use resync::TimeoutError;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let result = with_timeout(
///     async {
///         tokio::time::sleep(Duration::from_secs(10)).await;
///         Ok::<_, String>(42)
///     },
///     Duration::from_millis(10),
/// )
/// .await;
///
/// assert_eq!(result, Err(TimeoutError::Timeout { duration: Duration::from_millis(10) }));
/// # });
/// ```
pub async fn with_timeout<T, E, Fut>(work: Fut, duration: Duration) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Timeout { duration }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(async { Ok::<_, String>(42) }, Duration::from_secs(1)).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_timeout() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, String>(42)
            },
            Duration::from_millis(10),
        )
        .await;

        assert!(matches!(result, Err(TimeoutError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_with_timeout_inner_error() {
        let result = with_timeout(
            async { Err::<i32, _>("inner error".to_string()) },
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(TimeoutError::Inner(e)) if e == "inner error"));
    }
}
