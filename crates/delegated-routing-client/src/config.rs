//! Client configuration.

use delegated_routing_core::TransferProtocol;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings for a [`DelegatedRoutingClient`](crate::DelegatedRoutingClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint URL of the routing service.
    pub endpoint: String,
    /// Where the encoded request travels.
    #[serde(default)]
    pub placement: Placement,
    /// Connect timeout for the HTTP client, in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Providers lacking this protocol are dropped from results.
    #[serde(default)]
    pub required_protocol: RequiredProtocol,
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            placement: Placement::default(),
            connect_timeout_secs: None,
            required_protocol: RequiredProtocol::default(),
        }
    }
}

/// Request payload placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// POST with the request as body.
    #[default]
    Body,
    /// GET with the request in the `q` query parameter.
    Query,
}

impl FromStr for Placement {
    type Err = ConfigParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "body" => Ok(Placement::Body),
            "query" => Ok(Placement::Query),
            other => Err(ConfigParseError::Placement(other.to_string())),
        }
    }
}

/// Transfer protocol a provider must support to be returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredProtocol {
    #[default]
    Bitswap,
    GraphsyncFilecoinV1,
    /// Accept every provider.
    None,
}

impl RequiredProtocol {
    /// Whether a provider advertising `protocols` qualifies.
    pub fn accepts(self, protocols: &[TransferProtocol]) -> bool {
        match self {
            RequiredProtocol::None => true,
            RequiredProtocol::Bitswap => protocols
                .iter()
                .any(|p| matches!(p, TransferProtocol::Bitswap)),
            RequiredProtocol::GraphsyncFilecoinV1 => protocols
                .iter()
                .any(|p| matches!(p, TransferProtocol::GraphSyncFilv1(_))),
        }
    }
}

impl fmt::Display for RequiredProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredProtocol::Bitswap => "bitswap",
            RequiredProtocol::GraphsyncFilecoinV1 => "graphsync-filecoin-v1",
            RequiredProtocol::None => "none",
        })
    }
}

impl FromStr for RequiredProtocol {
    type Err = ConfigParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bitswap" => Ok(RequiredProtocol::Bitswap),
            "graphsync-filecoin-v1" => Ok(RequiredProtocol::GraphsyncFilecoinV1),
            "none" => Ok(RequiredProtocol::None),
            other => Err(ConfigParseError::Protocol(other.to_string())),
        }
    }
}

/// Error parsing a configuration value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigParseError {
    #[error("placement must be 'body' or 'query', got: {0}")]
    Placement(String),
    #[error("unknown transfer protocol: {0}")]
    Protocol(String),
}
