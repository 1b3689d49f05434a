//! Per-call outcome reporting.

use delegated_routing_core::Method;
use std::time::Duration;

/// Receives one report per finished call.
///
/// `error` is `None` on success, otherwise a label from
/// [`ClientError::label`](crate::ClientError::label).
pub trait CallObserver: Send + Sync {
    fn call_finished(&self, method: Method, elapsed: Duration, error: Option<&'static str>);
}

/// Default observer: one `tracing` event per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn call_finished(&self, method: Method, elapsed: Duration, error: Option<&'static str>) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match error {
            None => tracing::debug!(%method, elapsed_ms, "delegated routing call finished"),
            Some(error) => {
                tracing::warn!(%method, elapsed_ms, error, "delegated routing call failed")
            }
        }
    }
}
