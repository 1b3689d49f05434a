//! Generic content-routing surface over a provider source.

use crate::client::{AsyncResult, DelegatedRoutingClient};
use crate::error::ClientError;
use async_trait::async_trait;
use delegated_routing_core::{AddrInfo, Cid};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifetime requested when announcing content.
pub const DEFAULT_PROVIDE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Something that can look up and announce providers.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn find_providers_async(
        &self,
        cancel: &CancellationToken,
        key: Cid,
    ) -> Result<mpsc::Receiver<AsyncResult<Vec<AddrInfo>>>, ClientError>;

    async fn provide(
        &self,
        cancel: &CancellationToken,
        keys: Vec<Cid>,
        ttl: Duration,
    ) -> Result<Option<Duration>, ClientError>;
}

#[async_trait]
impl ProviderSource for DelegatedRoutingClient {
    async fn find_providers_async(
        &self,
        cancel: &CancellationToken,
        key: Cid,
    ) -> Result<mpsc::Receiver<AsyncResult<Vec<AddrInfo>>>, ClientError> {
        DelegatedRoutingClient::find_providers_async(self, cancel, key).await
    }

    async fn provide(
        &self,
        cancel: &CancellationToken,
        keys: Vec<Cid>,
        ttl: Duration,
    ) -> Result<Option<Duration>, ClientError> {
        DelegatedRoutingClient::provide(self, cancel, keys, ttl).await
    }
}

/// Content routing in terms of single peers.
pub struct ContentRoutingClient<S = DelegatedRoutingClient> {
    source: Arc<S>,
}

impl<S> Clone for ContentRoutingClient<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<S: ProviderSource + 'static> ContentRoutingClient<S> {
    /// Wrap `source`.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Wrap a source that is shared with other users.
    pub fn from_shared(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Stream providers of `key` one peer at a time.
    ///
    /// At most `count` peers are forwarded; 0 means no limit. Upstream
    /// error items are logged and skipped. The channel closes after the
    /// last peer, and is closed immediately if the lookup cannot start.
    /// Reaching the limit or losing the receiver stops the upstream call.
    pub async fn find_providers_async(
        &self,
        cancel: &CancellationToken,
        key: Cid,
        count: usize,
    ) -> mpsc::Receiver<AddrInfo> {
        let (tx, rx) = mpsc::channel(1);
        let call = cancel.child_token();
        let stop = call.clone().drop_guard();
        let mut upstream = match self.source.find_providers_async(&call, key).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(%key, error = %e, "find providers failed to start");
                return rx;
            }
        };

        let cancel = call;
        tokio::spawn(async move {
            let _stop = stop;
            let mut forwarded = 0usize;
            'results: loop {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = upstream.recv() => match result {
                        Some(result) => result,
                        None => break,
                    },
                };
                let infos = match result {
                    Ok(infos) => infos,
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "find providers emitted a transient error");
                        continue;
                    }
                };
                for info in infos {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'results,
                        sent = tx.send(info) => if sent.is_err() { break 'results },
                    }
                    forwarded += 1;
                    if count > 0 && forwarded >= count {
                        break 'results;
                    }
                }
            }
        });
        rx
    }

    /// Announce this peer as a provider of `key`.
    ///
    /// Does nothing unless `announce` is set.
    pub async fn provide(
        &self,
        cancel: &CancellationToken,
        key: Cid,
        announce: bool,
    ) -> Result<(), ClientError> {
        if !announce {
            return Ok(());
        }
        self.source
            .provide(cancel, vec![key], DEFAULT_PROVIDE_TTL)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegated_routing_core::{PeerId, ServiceError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits `results` single-peer batches, optionally led by an error.
    struct FixedSource {
        results: usize,
        leading_error: bool,
        provides: AtomicUsize,
    }

    impl FixedSource {
        fn new(results: usize) -> Self {
            Self {
                results,
                leading_error: false,
                provides: AtomicUsize::new(0),
            }
        }
    }

    fn peer(seed: u8) -> AddrInfo {
        let mut bytes = vec![0x12, 0x20];
        bytes.extend([seed; 32]);
        AddrInfo::new(PeerId::from_bytes(&bytes).unwrap(), vec![])
    }

    #[async_trait]
    impl ProviderSource for FixedSource {
        async fn find_providers_async(
            &self,
            _cancel: &CancellationToken,
            _key: Cid,
        ) -> Result<mpsc::Receiver<AsyncResult<Vec<AddrInfo>>>, ClientError> {
            let (tx, rx) = mpsc::channel(1);
            let results = self.results;
            let leading_error = self.leading_error;
            tokio::spawn(async move {
                if leading_error {
                    let _ = tx.send(Err(ServiceError::new("flaky").into())).await;
                }
                for i in 0..results {
                    if tx.send(Ok(vec![peer(i as u8)])).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }

        async fn provide(
            &self,
            _cancel: &CancellationToken,
            _keys: Vec<Cid>,
            ttl: Duration,
        ) -> Result<Option<Duration>, ClientError> {
            self.provides.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ttl))
        }
    }

    fn key() -> Cid {
        "QmbWqxBEKC3P8tqsKc98xmWNzrzDtRLMiMPL8wBuTGsMnR".parse().unwrap()
    }

    async fn count_results(source: FixedSource, wanted: usize) -> usize {
        let client = ContentRoutingClient::new(source);
        let mut rx = client
            .find_providers_async(&CancellationToken::new(), key(), wanted)
            .await;
        let mut n = 0;
        while rx.recv().await.is_some() {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn unlimited_results() {
        assert_eq!(count_results(FixedSource::new(5), 0).await, 5);
    }

    #[tokio::test]
    async fn fewer_results() {
        assert_eq!(count_results(FixedSource::new(5), 3).await, 3);
    }

    #[tokio::test]
    async fn more_results() {
        assert_eq!(count_results(FixedSource::new(5), 7).await, 5);
    }

    #[tokio::test]
    async fn upstream_errors_are_skipped() {
        let mut source = FixedSource::new(2);
        source.leading_error = true;
        assert_eq!(count_results(source, 0).await, 2);
    }

    #[tokio::test]
    async fn cancelled_lookup_closes() {
        let client = ContentRoutingClient::new(FixedSource::new(1000));
        let cancel = CancellationToken::new();
        let mut rx = client.find_providers_async(&cancel, key(), 0).await;
        assert!(rx.recv().await.is_some());
        cancel.cancel();
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    /// Sends one peer, then holds its channel open until its token fires.
    #[derive(Default)]
    struct OpenEnded {
        released: CancellationToken,
    }

    #[async_trait]
    impl ProviderSource for OpenEnded {
        async fn find_providers_async(
            &self,
            cancel: &CancellationToken,
            _key: Cid,
        ) -> Result<mpsc::Receiver<AsyncResult<Vec<AddrInfo>>>, ClientError> {
            let (tx, rx) = mpsc::channel(1);
            let cancel = cancel.clone();
            let released = self.released.clone();
            tokio::spawn(async move {
                let _ = tx.send(Ok(vec![peer(1)])).await;
                cancel.cancelled().await;
                released.cancel();
            });
            Ok(rx)
        }

        async fn provide(
            &self,
            _cancel: &CancellationToken,
            _keys: Vec<Cid>,
            _ttl: Duration,
        ) -> Result<Option<Duration>, ClientError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn reaching_the_limit_stops_the_upstream_call() {
        let source = Arc::new(OpenEnded::default());
        let client = ContentRoutingClient::from_shared(source.clone());
        let cancel = CancellationToken::new();
        let mut rx = client.find_providers_async(&cancel, key(), 1).await;
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());

        let released = tokio::time::timeout(Duration::from_secs(5), source.released.cancelled()).await;
        assert!(released.is_ok(), "upstream call still running after the limit");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn provide_respects_announce() {
        let client = ContentRoutingClient::new(FixedSource::new(0));
        let cancel = CancellationToken::new();
        client.provide(&cancel, key(), false).await.unwrap();
        assert_eq!(client.source.provides.load(Ordering::SeqCst), 0);
        client.provide(&cancel, key(), true).await.unwrap();
        assert_eq!(client.source.provides.load(Ordering::SeqCst), 1);
    }
}
