//! Find-providers calls, answered as peer address lists.

use crate::client::{AsyncResult, DelegatedRoutingClient};
use crate::config::RequiredProtocol;
use crate::error::ClientError;
use delegated_routing_core::{AddrInfo, Cid, FindProvidersRequest, FindProvidersResponse, ProviderNode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

impl DelegatedRoutingClient {
    /// Stream provider addresses for `key`, one batch per response.
    ///
    /// Providers without the configured transfer protocol are dropped, as
    /// are unparseable peers and addresses.
    pub async fn find_providers_async(
        &self,
        cancel: &CancellationToken,
        key: Cid,
    ) -> Result<mpsc::Receiver<AsyncResult<Vec<AddrInfo>>>, ClientError> {
        let required = self.inner().required_protocol;
        self.call_async_with(cancel, FindProvidersRequest { key }, move |r| {
            Some(parse_providers(&r, required))
        })
        .await
    }

    /// Collect every provider address for `key`.
    pub async fn find_providers(
        &self,
        cancel: &CancellationToken,
        key: Cid,
    ) -> Result<Vec<AddrInfo>, ClientError> {
        let responses = self.call(cancel, FindProvidersRequest { key }).await?;
        let required = self.inner().required_protocol;
        Ok(responses
            .iter()
            .flat_map(|r| parse_providers(r, required))
            .collect())
    }
}

/// Turn a response into dialable peers.
pub fn parse_providers(response: &FindProvidersResponse, required: RequiredProtocol) -> Vec<AddrInfo> {
    response
        .providers
        .iter()
        .filter(|provider| required.accepts(&provider.proto))
        .filter_map(|provider| match &provider.node {
            ProviderNode::Peer(peer) => match AddrInfo::from_peer(peer) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping provider with invalid peer id");
                    None
                }
            },
            ProviderNode::Unknown { tag, .. } => {
                tracing::debug!(%tag, "skipping provider with unknown node type");
                None
            }
        })
        .collect()
}
