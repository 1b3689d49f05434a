//! Signed provider announcements.

use crate::client::{AsyncResult, DelegatedRoutingClient, drain};
use crate::error::ClientError;
use delegated_routing_core::{Cid, ProvideRequest, ProvideResponse, TransferProtocol};
use libp2p_identity::{Keypair, SigningError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Signs provide requests on behalf of the announced peer.
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError>;
}

impl Signer for Keypair {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        Keypair::sign(self, payload)
    }
}

impl DelegatedRoutingClient {
    /// Announce that this peer provides `keys`, streaming each advisory
    /// TTL granted by the service.
    ///
    /// Fails before sending when no provide identity is configured.
    pub async fn provide_async(
        &self,
        cancel: &CancellationToken,
        keys: Vec<Cid>,
        ttl: Duration,
    ) -> Result<mpsc::Receiver<AsyncResult<Duration>>, ClientError> {
        let request = self.signed_provide(keys, ttl)?;
        self.call_async_with(cancel, request, |r: ProvideResponse| {
            Some(Duration::from_millis(r.advisory_ttl.max(0) as u64))
        })
        .await
    }

    /// Announce `keys` and wait for the service's answer.
    ///
    /// Returns the last advisory TTL granted, if any.
    pub async fn provide(
        &self,
        cancel: &CancellationToken,
        keys: Vec<Cid>,
        ttl: Duration,
    ) -> Result<Option<Duration>, ClientError> {
        let call_token = cancel.child_token();
        let _stop = call_token.clone().drop_guard();
        let rx = self.provide_async(&call_token, keys, ttl).await?;
        Ok(drain(cancel, rx).await?.pop())
    }

    fn signed_provide(&self, keys: Vec<Cid>, ttl: Duration) -> Result<ProvideRequest, ClientError> {
        let (identity, signer) = self
            .inner()
            .provide_identity
            .as_ref()
            .ok_or(ClientError::MissingIdentity)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(millis)
            .unwrap_or_default();
        let mut request = ProvideRequest {
            keys,
            provider: identity.to_provider(vec![TransferProtocol::Bitswap]),
            timestamp,
            advisory_ttl: millis(ttl),
            signature: Vec::new(),
        };
        request.signature = signer.sign(&request.signing_payload()?)?;
        Ok(request)
    }
}

/// Milliseconds as sent on the wire, saturating instead of wrapping.
pub(crate) fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
