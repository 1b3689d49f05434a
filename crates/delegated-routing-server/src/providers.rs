//! Serve provider lookups from a plain key-to-peers function.

use crate::error::Rejection;
use crate::service::{DelegatedRoutingService, Replies};
use async_trait::async_trait;
use delegated_routing_core::{
    AddrInfo, Cid, FindProvidersRequest, FindProvidersResponse, Method, ServiceError,
    TransferProtocol,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Looks up the peers providing a key, in batches.
#[async_trait]
pub trait ProviderLookup: Send + Sync + 'static {
    async fn find_providers(
        &self,
        cancel: &CancellationToken,
        key: Cid,
    ) -> Result<mpsc::Receiver<Result<Vec<AddrInfo>, ServiceError>>, Rejection>;
}

/// A [`DelegatedRoutingService`] that only answers FindProviders.
///
/// Every peer is advertised as a bitswap provider. Lookup rejections and
/// per-batch errors are logged and leave the response short rather than
/// failing it.
pub struct FindProvidersServer<L> {
    lookup: Arc<L>,
}

impl<L: ProviderLookup> FindProvidersServer<L> {
    /// Serve find-providers from `lookup`.
    pub fn new(lookup: L) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }
}

#[async_trait]
impl<L: ProviderLookup> DelegatedRoutingService for FindProvidersServer<L> {
    async fn find_providers(
        &self,
        cancel: CancellationToken,
        request: FindProvidersRequest,
    ) -> Result<Replies<FindProvidersResponse>, Rejection> {
        let (tx, rx) = mpsc::channel(1);
        let lookup = self.lookup.clone();
        let key = request.key;
        tokio::spawn(async move {
            let mut found = match lookup.find_providers(&cancel, key).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!(%key, error = %e, "provider lookup rejected request");
                    return;
                }
            };
            loop {
                let batch = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    batch = found.recv() => match batch {
                        Some(batch) => batch,
                        None => return,
                    },
                };
                let infos = match batch {
                    Ok(infos) => infos,
                    Err(e) => {
                        tracing::error!(%key, error = %e, "provider lookup returned error");
                        continue;
                    }
                };
                let response = FindProvidersResponse {
                    providers: infos
                        .iter()
                        .map(|info| info.to_provider(vec![TransferProtocol::Bitswap]))
                        .collect(),
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = tx.send(Ok(response)) => if sent.is_err() { return },
                }
            }
        });
        Ok(rx)
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::FindProviders]
    }
}
