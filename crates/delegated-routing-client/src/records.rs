//! Naming record reads and writes.

use crate::client::{AsyncResult, DelegatedRoutingClient, drain};
use crate::error::ClientError;
use delegated_routing_core::{GetIpnsRequest, GetIpnsResponse, PutIpnsRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A record failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidRecord(pub String);

/// Checks naming records and picks the best of several.
pub trait Validator: Send + Sync {
    fn validate(&self, key: &[u8], record: &[u8]) -> Result<(), InvalidRecord>;

    /// Index of the preferred record. `records` is never empty.
    fn select(&self, key: &[u8], records: &[Vec<u8>]) -> Result<usize, InvalidRecord>;
}

impl DelegatedRoutingClient {
    /// Stream the records stored under `id`.
    ///
    /// With a validator configured, invalid records are dropped.
    pub async fn get_ipns_async(
        &self,
        cancel: &CancellationToken,
        id: Vec<u8>,
    ) -> Result<mpsc::Receiver<AsyncResult<Vec<u8>>>, ClientError> {
        let validator = self.inner().validator.clone();
        let key = id.clone();
        self.call_async_with(cancel, GetIpnsRequest { id }, move |r: GetIpnsResponse| {
            let Some(validator) = &validator else {
                return Some(r.record);
            };
            match validator.validate(&key, &r.record) {
                Ok(()) => Some(r.record),
                Err(e) => {
                    tracing::info!(error = %e, "received invalid ipns record");
                    None
                }
            }
        })
        .await
    }

    /// Fetch the records stored under `id`.
    ///
    /// With a validator configured the result holds only the best valid
    /// record, or nothing when none is valid; otherwise every raw record.
    pub async fn get_ipns(
        &self,
        cancel: &CancellationToken,
        id: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        let call_token = cancel.child_token();
        let _stop = call_token.clone().drop_guard();
        let rx = self.get_ipns_async(&call_token, id.clone()).await?;
        let records = drain(cancel, rx).await?;
        select_best(self.inner().validator.as_deref(), &id, records)
    }

    /// Store `record` under `id`.
    pub async fn put_ipns(
        &self,
        cancel: &CancellationToken,
        id: Vec<u8>,
        record: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.call(cancel, PutIpnsRequest { id, record }).await?;
        Ok(())
    }
}

fn select_best(
    validator: Option<&dyn Validator>,
    key: &[u8],
    records: Vec<Vec<u8>>,
) -> Result<Vec<Vec<u8>>, ClientError> {
    let Some(validator) = validator else {
        return Ok(records);
    };
    if records.is_empty() {
        return Ok(records);
    }
    let best = validator
        .select(key, &records)
        .map_err(ClientError::Selection)?;
    let count = records.len();
    match records.into_iter().nth(best) {
        Some(record) => Ok(vec![record]),
        None => Err(ClientError::Selection(InvalidRecord(format!(
            "selected record {best} of {count}"
        )))),
    }
}
