//! Server side of delegated content routing.
//!
//! Implement [`DelegatedRoutingService`] and mount [`router`] in an axum
//! application. Each answered request streams newline-delimited response
//! envelopes until the service closes its channel or reports an error.

mod error;
mod handler;
mod providers;
mod service;

pub use error::Rejection;
pub use handler::{router, router_shared};
pub use providers::{FindProvidersServer, ProviderLookup};
pub use service::{DelegatedRoutingService, Replies, reply};

pub use tokio_util::sync::CancellationToken;
