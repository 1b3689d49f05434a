//! In-memory routing tables served by the daemon.

use crate::config::{ConfigError, DaemonConfig};
use async_trait::async_trait;
use delegated_routing_core::{
    AddrInfo, Cid, FindProvidersRequest, FindProvidersResponse, GetIpnsRequest, GetIpnsResponse,
    ProvideRequest, ProvideResponse, ProviderNode, PutIpnsRequest, PutIpnsResponse, ServiceError,
    TransferProtocol,
};
use delegated_routing_server::{
    CancellationToken, DelegatedRoutingService, Rejection, Replies, reply,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    providers: HashMap<Cid, Vec<AddrInfo>>,
    records: HashMap<Vec<u8>, Vec<u8>>,
}

impl Tables {
    /// Add or refresh a provider, keeping one entry per peer.
    fn add_provider(&mut self, key: Cid, info: AddrInfo) {
        let entries = self.providers.entry(key).or_default();
        match entries.iter_mut().find(|e| e.id == info.id) {
            Some(existing) => *existing = info,
            None => entries.push(info),
        }
    }
}

/// A routing service answering from tables loaded at startup and updated by
/// PutIPNS and Provide.
#[derive(Clone)]
pub struct StaticService {
    tables: Arc<RwLock<Tables>>,
    max_provide_ttl: Duration,
}

impl StaticService {
    /// An empty service granting at most `max_provide_ttl` per announcement.
    pub fn new(max_provide_ttl: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            max_provide_ttl,
        }
    }

    /// A service preloaded with the configured tables.
    pub fn from_config(config: &DaemonConfig) -> Result<Self, ConfigError> {
        let mut tables = Tables::default();
        for (key, info) in config.provider_table()? {
            tables.add_provider(key, info);
        }
        tables.records.extend(config.record_table()?);
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            max_provide_ttl: config.max_provide_ttl(),
        })
    }

    /// Number of distinct peers providing `key`.
    pub async fn provider_count(&self, key: &Cid) -> usize {
        self.tables
            .read()
            .await
            .providers
            .get(key)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DelegatedRoutingService for StaticService {
    async fn find_providers(
        &self,
        _cancel: CancellationToken,
        request: FindProvidersRequest,
    ) -> Result<Replies<FindProvidersResponse>, Rejection> {
        let tables = self.tables.read().await;
        let providers = tables
            .providers
            .get(&request.key)
            .map(|infos| {
                infos
                    .iter()
                    .map(|info| info.to_provider(vec![TransferProtocol::Bitswap]))
                    .collect()
            })
            .unwrap_or_default();
        tracing::debug!(key = %request.key, "answering find providers");
        Ok(reply(Ok(FindProvidersResponse { providers })))
    }

    async fn get_ipns(
        &self,
        _cancel: CancellationToken,
        request: GetIpnsRequest,
    ) -> Result<Replies<GetIpnsResponse>, Rejection> {
        let tables = self.tables.read().await;
        let response = match tables.records.get(&request.id) {
            Some(record) => Ok(GetIpnsResponse {
                record: record.clone(),
            }),
            None => Err(ServiceError::new("not found")),
        };
        Ok(reply(response))
    }

    async fn put_ipns(
        &self,
        _cancel: CancellationToken,
        request: PutIpnsRequest,
    ) -> Result<Replies<PutIpnsResponse>, Rejection> {
        self.tables
            .write()
            .await
            .records
            .insert(request.id, request.record);
        Ok(reply(Ok(PutIpnsResponse {})))
    }

    async fn provide(
        &self,
        _cancel: CancellationToken,
        request: ProvideRequest,
    ) -> Result<Replies<ProvideResponse>, Rejection> {
        let peer = match request.verify() {
            Ok(peer) => peer,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting unverifiable provide");
                return Ok(reply(Err(ServiceError::new("invalid signature"))));
            }
        };
        let info = match &request.provider.node {
            ProviderNode::Peer(wire) => AddrInfo::from_peer(wire)
                .unwrap_or_else(|_| AddrInfo::new(peer, Vec::new())),
            ProviderNode::Unknown { .. } => AddrInfo::new(peer, Vec::new()),
        };

        let mut tables = self.tables.write().await;
        for key in &request.keys {
            tables.add_provider(*key, info.clone());
        }
        let requested = Duration::from_millis(request.advisory_ttl.max(0) as u64);
        let granted = requested.min(self.max_provide_ttl);
        tracing::info!(%peer, keys = request.keys.len(), ?granted, "provider announced");
        Ok(reply(Ok(ProvideResponse {
            advisory_ttl: i64::try_from(granted.as_millis()).unwrap_or(i64::MAX),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegated_routing_core::{Multiaddr, PeerId};
    use libp2p_identity::Keypair;

    fn key() -> Cid {
        "QmbWqxBEKC3P8tqsKc98xmWNzrzDtRLMiMPL8wBuTGsMnR".parse().unwrap()
    }

    fn signed_provide(keypair: &Keypair, announced: PeerId, ttl_ms: i64) -> ProvideRequest {
        let addr: Multiaddr = "/ip4/10.0.0.2/tcp/4001".parse().unwrap();
        let mut request = ProvideRequest {
            keys: vec![key()],
            provider: AddrInfo::new(announced, vec![addr])
                .to_provider(vec![TransferProtocol::Bitswap]),
            timestamp: 1,
            advisory_ttl: ttl_ms,
            signature: Vec::new(),
        };
        request.signature = keypair.sign(&request.signing_payload().unwrap()).unwrap();
        request
    }

    #[tokio::test]
    async fn records_round_trip() {
        let service = StaticService::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let mut missing = service
            .get_ipns(cancel.clone(), GetIpnsRequest { id: b"p".to_vec() })
            .await
            .unwrap();
        assert!(matches!(missing.recv().await, Some(Err(_))));

        service
            .put_ipns(
                cancel.clone(),
                PutIpnsRequest {
                    id: b"p".to_vec(),
                    record: b"seq:2".to_vec(),
                },
            )
            .await
            .unwrap();
        let mut found = service
            .get_ipns(cancel, GetIpnsRequest { id: b"p".to_vec() })
            .await
            .unwrap();
        assert_eq!(found.recv().await.unwrap().unwrap().record, b"seq:2".to_vec());
    }

    #[tokio::test]
    async fn verified_provide_is_recorded_and_capped() {
        let service = StaticService::new(Duration::from_secs(60));
        let keypair = Keypair::generate_ed25519();
        let request = signed_provide(&keypair, keypair.public().to_peer_id(), 3_600_000);

        let mut rx = service
            .provide(CancellationToken::new(), request)
            .await
            .unwrap();
        let granted = rx.recv().await.unwrap().unwrap();
        assert_eq!(granted.advisory_ttl, 60_000);
        assert_eq!(service.provider_count(&key()).await, 1);

        // Announcing again refreshes rather than duplicates.
        let request = signed_provide(&keypair, keypair.public().to_peer_id(), 1000);
        service
            .provide(CancellationToken::new(), request)
            .await
            .unwrap();
        assert_eq!(service.provider_count(&key()).await, 1);
    }

    #[tokio::test]
    async fn unbounded_cap_saturates_the_granted_ttl() {
        let service = StaticService::new(Duration::MAX);
        let keypair = Keypair::generate_ed25519();
        let request = signed_provide(&keypair, keypair.public().to_peer_id(), i64::MAX);

        let mut rx = service
            .provide(CancellationToken::new(), request)
            .await
            .unwrap();
        let granted = rx.recv().await.unwrap().unwrap();
        assert_eq!(granted.advisory_ttl, i64::MAX);
    }

    #[tokio::test]
    async fn forged_provide_is_refused() {
        let service = StaticService::new(Duration::from_secs(60));
        let signer = Keypair::generate_ed25519();
        let victim = Keypair::generate_ed25519().public().to_peer_id();
        let request = signed_provide(&signer, victim, 1000);

        let mut rx = service
            .provide(CancellationToken::new(), request)
            .await
            .unwrap();
        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code, "invalid signature");
        assert_eq!(service.provider_count(&key()).await, 0);
    }

    #[tokio::test]
    async fn configured_providers_are_served() {
        let config = DaemonConfig::from_toml(
            r#"
            [[providers]]
            key = "QmbWqxBEKC3P8tqsKc98xmWNzrzDtRLMiMPL8wBuTGsMnR"
            peer = "12D3KooWD3eckifWpRn9wQpMG9R9hX3sD158z7EqHWmweQAJU5SA"
            addrs = ["/ip4/10.0.0.1/tcp/4001"]
            "#,
        )
        .unwrap();
        let service = StaticService::from_config(&config).unwrap();
        let mut rx = service
            .find_providers(CancellationToken::new(), FindProvidersRequest { key: key() })
            .await
            .unwrap();
        let response = rx.recv().await.unwrap().unwrap();
        assert_eq!(response.providers.len(), 1);
        assert_eq!(response.providers[0].proto, vec![TransferProtocol::Bitswap]);
    }
}
