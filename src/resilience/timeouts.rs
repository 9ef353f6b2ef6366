//! Deadline enforcement for store commands.
//!
//! The breaker never times out the operation it wraps, so every transport call
//! carries its own deadline. Timeout errors are distinct from transport errors.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::store::StoreError;

/// Await `fut`, failing with [`StoreError::Timeout`] once `deadline` elapses.
pub async fn with_deadline<T, E, Fut>(deadline: Duration, fut: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let result: Result<(), StoreError> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<(), StoreError>(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_inner_error_is_converted() {
        let result: Result<(), StoreError> = with_deadline(Duration::from_secs(1), async {
            Err(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
