//! The trait a routing backend implements.

use crate::error::Rejection;
use async_trait::async_trait;
use delegated_routing_core::{
    FindProvidersRequest, FindProvidersResponse, GetIpnsRequest, GetIpnsResponse, Method,
    ProvideRequest, ProvideResponse, PutIpnsRequest, PutIpnsResponse, ServiceError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel a service streams its answers on.
///
/// An `Err` item is written as an error envelope and ends the response.
/// Closing the sender ends it normally.
pub type Replies<T> = mpsc::Receiver<Result<T, ServiceError>>;

/// A delegated routing backend.
///
/// Each method either rejects the request outright or returns a channel
/// that the handler drains into the response body. `cancel` fires when the
/// peer goes away or the response ends early; producers should stop then.
/// Methods left at their default are answered as not supported.
#[async_trait]
pub trait DelegatedRoutingService: Send + Sync + 'static {
    async fn find_providers(
        &self,
        cancel: CancellationToken,
        request: FindProvidersRequest,
    ) -> Result<Replies<FindProvidersResponse>, Rejection> {
        let _ = (cancel, request);
        Err(Rejection::not_supported(Method::FindProviders))
    }

    async fn get_ipns(
        &self,
        cancel: CancellationToken,
        request: GetIpnsRequest,
    ) -> Result<Replies<GetIpnsResponse>, Rejection> {
        let _ = (cancel, request);
        Err(Rejection::not_supported(Method::GetIpns))
    }

    async fn put_ipns(
        &self,
        cancel: CancellationToken,
        request: PutIpnsRequest,
    ) -> Result<Replies<PutIpnsResponse>, Rejection> {
        let _ = (cancel, request);
        Err(Rejection::not_supported(Method::PutIpns))
    }

    async fn provide(
        &self,
        cancel: CancellationToken,
        request: ProvideRequest,
    ) -> Result<Replies<ProvideResponse>, Rejection> {
        let _ = (cancel, request);
        Err(Rejection::not_supported(Method::Provide))
    }

    /// Methods reported to Identify.
    fn methods(&self) -> Vec<Method> {
        vec![
            Method::FindProviders,
            Method::GetIpns,
            Method::PutIpns,
            Method::Provide,
        ]
    }
}

/// Send one reply and close the channel.
pub fn reply<T: Send + 'static>(item: Result<T, ServiceError>) -> Replies<T> {
    let (tx, rx) = mpsc::channel(1);
    // Capacity one and a fresh channel: this cannot fail.
    let _ = tx.try_send(item);
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl DelegatedRoutingService for Nothing {}

    #[tokio::test]
    async fn defaults_reject_as_not_supported() {
        let err = Nothing
            .get_ipns(CancellationToken::new(), GetIpnsRequest { id: vec![1] })
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::NotSupported(Method::GetIpns)));
        assert_eq!(err.to_string(), "GetIPNS not supported");
    }

    #[tokio::test]
    async fn reply_yields_one_item() {
        let mut rx = reply::<PutIpnsResponse>(Ok(PutIpnsResponse {}));
        assert!(matches!(rx.recv().await, Some(Ok(_))));
        assert!(rx.recv().await.is_none());
    }
}
