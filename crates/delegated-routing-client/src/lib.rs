//! Client for delegated content routing.
//!
//! [`DelegatedRoutingClient`] speaks the streaming HTTP protocol: every call
//! returns a channel of results fed by one background task, and every call
//! takes a [`CancellationToken`] that stops it. [`ContentRoutingClient`]
//! layers peer-at-a-time provider lookups and announcements on top.

mod client;
mod config;
mod content_routing;
mod deadline;
mod error;
mod observe;
mod provide;
mod providers;
mod records;

pub use client::{AsyncResult, ClientBuilder, DelegatedRoutingClient};
pub use config::{ClientConfig, ConfigParseError, Placement, RequiredProtocol};
pub use content_routing::{ContentRoutingClient, DEFAULT_PROVIDE_TTL, ProviderSource};
pub use deadline::with_deadline;
pub use error::ClientError;
pub use observe::{CallObserver, TracingObserver};
pub use provide::Signer;
pub use providers::parse_providers;
pub use records::{InvalidRecord, Validator};

pub use tokio_util::sync::CancellationToken;
