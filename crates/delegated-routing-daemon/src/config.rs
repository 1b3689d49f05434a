//! Daemon configuration file.
//!
//! ```toml
//! listen = "127.0.0.1:8190"
//! max_provide_ttl_secs = 86400
//!
//! [[providers]]
//! key = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy"
//! peer = "12D3KooWD3eckifWpRn9wQpMG9R9hX3sD158z7EqHWmweQAJU5SA"
//! addrs = ["/ip4/10.0.0.1/tcp/4001"]
//!
//! [[records]]
//! peer = "12D3KooWD3eckifWpRn9wQpMG9R9hX3sD158z7EqHWmweQAJU5SA"
//! record = "c2VxOjE"
//! ```

use base64::Engine;
use delegated_routing_core::codec::BASE64;
use delegated_routing_core::{AddrInfo, Cid, Multiaddr, PeerId};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid key {key}: {reason}")]
    Key { key: String, reason: String },
    #[error("invalid peer id {peer}: {reason}")]
    Peer { peer: String, reason: String },
    #[error("invalid address {addr}: {reason}")]
    Addr { addr: String, reason: String },
    #[error("invalid record for {peer}: {reason}")]
    Record { peer: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Upper bound on the lifetime granted to provide announcements.
    #[serde(default = "default_max_provide_ttl")]
    pub max_provide_ttl_secs: u64,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub key: String,
    pub peer: String,
    #[serde(default)]
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordEntry {
    pub peer: String,
    /// Base64, padding optional.
    pub record: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8190))
}

fn default_max_provide_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_provide_ttl_secs: default_max_provide_ttl(),
            providers: Vec::new(),
            records: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The provide lifetime cap as a `Duration`.
    pub fn max_provide_ttl(&self) -> Duration {
        Duration::from_secs(self.max_provide_ttl_secs)
    }

    /// The provider table, keyed by content.
    pub fn provider_table(&self) -> Result<Vec<(Cid, AddrInfo)>, ConfigError> {
        self.providers
            .iter()
            .map(|entry| {
                let key = entry.key.parse::<Cid>().map_err(|e| ConfigError::Key {
                    key: entry.key.clone(),
                    reason: e.to_string(),
                })?;
                let id = parse_peer(&entry.peer)?;
                let addrs = entry
                    .addrs
                    .iter()
                    .map(|addr| {
                        addr.parse::<Multiaddr>().map_err(|e| ConfigError::Addr {
                            addr: addr.clone(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<Result<_, _>>()?;
                Ok((key, AddrInfo::new(id, addrs)))
            })
            .collect()
    }

    /// Naming records, keyed by binary peer id.
    pub fn record_table(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConfigError> {
        self.records
            .iter()
            .map(|entry| {
                let id = parse_peer(&entry.peer)?;
                let record = BASE64
                    .decode(entry.record.trim())
                    .map_err(|e| ConfigError::Record {
                        peer: entry.peer.clone(),
                        reason: e.to_string(),
                    })?;
                Ok((id.to_bytes(), record))
            })
            .collect()
    }
}

fn parse_peer(peer: &str) -> Result<PeerId, ConfigError> {
    peer.parse().map_err(|e: libp2p_identity::ParseError| ConfigError::Peer {
        peer: peer.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "12D3KooWD3eckifWpRn9wQpMG9R9hX3sD158z7EqHWmweQAJU5SA";

    #[test]
    fn empty_config_uses_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.listen, default_listen());
        assert_eq!(config.max_provide_ttl(), Duration::from_secs(86400));
        assert!(config.providers.is_empty());
    }

    #[test]
    fn tables_parse() {
        let config = DaemonConfig::from_toml(&format!(
            r#"
            listen = "0.0.0.0:9000"

            [[providers]]
            key = "QmbWqxBEKC3P8tqsKc98xmWNzrzDtRLMiMPL8wBuTGsMnR"
            peer = "{PEER}"
            addrs = ["/ip4/10.0.0.1/tcp/4001"]

            [[records]]
            peer = "{PEER}"
            record = "c2VxOjE="
            "#
        ))
        .unwrap();
        assert_eq!(config.listen.port(), 9000);

        let providers = config.provider_table().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].1.id.to_string(), PEER);
        assert_eq!(providers[0].1.addrs.len(), 1);

        let records = config.record_table().unwrap();
        assert_eq!(records[0].1, b"seq:1".to_vec());
    }

    #[test]
    fn bad_entries_name_the_culprit() {
        let config = DaemonConfig::from_toml(&format!(
            r#"
            [[providers]]
            key = "QmbWqxBEKC3P8tqsKc98xmWNzrzDtRLMiMPL8wBuTGsMnR"
            peer = "{PEER}"
            addrs = ["not an address"]
            "#
        ))
        .unwrap();
        let err = config.provider_table().unwrap_err();
        assert!(matches!(err, ConfigError::Addr { ref addr, .. } if addr == "not an address"));
    }

    #[test]
    fn mistyped_values_are_rejected() {
        assert!(DaemonConfig::from_toml("listen = 5").is_err());
    }
}
