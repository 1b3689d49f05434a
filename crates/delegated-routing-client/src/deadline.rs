use crate::error::ClientError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `f` with a child of `parent` that is cancelled after `timeout`.
///
/// If the deadline passes first, the child token is cancelled, which stops
/// any call started with it, and `DeadlineExceeded` is returned.
pub async fn with_deadline<T, F, Fut>(
    parent: &CancellationToken,
    timeout: Duration,
    f: F,
) -> Result<T, ClientError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let token = parent.child_token();
    let _stop = token.clone().drop_guard();
    match tokio::time::timeout(timeout, f(token)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::DeadlineExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_cancels_the_token() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let result: Result<(), _> = with_deadline(
            &CancellationToken::new(),
            Duration::from_secs(1),
            |token| async move {
                let _ = seen_tx.send(token.clone());
                std::future::pending::<()>().await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(ClientError::DeadlineExceeded)));
        assert!(seen_rx.await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn result_passes_through() {
        let result = with_deadline(&CancellationToken::new(), Duration::from_secs(5), |_| async {
            Ok(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_child() {
        let parent = CancellationToken::new();
        parent.cancel();
        let result = with_deadline(&parent, Duration::from_secs(5), |token| async move {
            token.cancelled().await;
            Err::<(), _>(ClientError::Cancelled)
        })
        .await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }
}
