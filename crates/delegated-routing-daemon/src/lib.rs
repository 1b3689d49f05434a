//! Shared pieces of the `routingd` daemon and the `routing` CLI.

pub mod config;
pub mod store;

pub use config::{ConfigError, DaemonConfig};
pub use store::StaticService;
