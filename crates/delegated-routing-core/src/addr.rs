//! Peers and their dialable addresses.

use crate::proto::{Peer, Provider, ProviderNode, TransferProtocol};
use libp2p_identity::PeerId;
use multiaddr::{Multiaddr, Protocol};

/// A peer id together with the addresses it can be reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    /// Addresses as given; no normalization.
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }

    /// Wire form of the peer. Each address carries a trailing `/p2p/<id>`.
    pub fn to_peer(&self) -> Peer {
        let multiaddresses = self
            .addrs
            .iter()
            .map(|addr| {
                let mut addr = addr.clone();
                if !matches!(addr.iter().last(), Some(Protocol::P2p(_))) {
                    addr.push(Protocol::P2p(self.id));
                }
                addr.to_vec()
            })
            .collect();
        Peer {
            id: self.id.to_bytes(),
            multiaddresses,
        }
    }

    /// Read a wire peer, dropping malformed addresses and stripping a
    /// trailing `/p2p/<id>` that names the peer itself.
    pub fn from_peer(peer: &Peer) -> Result<Self, libp2p_identity::ParseError> {
        let id = PeerId::from_bytes(&peer.id)?;
        let addrs = peer
            .multiaddresses
            .iter()
            .filter_map(|bytes| match Multiaddr::try_from(bytes.clone()) {
                Ok(addr) => Some(strip_own_suffix(addr, &id)),
                Err(e) => {
                    tracing::debug!(peer = %id, error = %e, "skipping malformed multiaddress");
                    None
                }
            })
            .collect();
        Ok(Self { id, addrs })
    }

    /// A provider record advertising this peer over the given protocols.
    pub fn to_provider(&self, proto: Vec<TransferProtocol>) -> Provider {
        Provider {
            node: ProviderNode::Peer(self.to_peer()),
            proto,
        }
    }
}

fn strip_own_suffix(mut addr: Multiaddr, id: &PeerId) -> Multiaddr {
    if let Some(Protocol::P2p(suffix)) = addr.iter().last() {
        if suffix == *id {
            addr.pop();
        }
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_id(seed: u8) -> PeerId {
        let mut bytes = vec![0x12, 0x20];
        bytes.extend([seed; 32]);
        PeerId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn own_suffix_is_added_and_stripped() {
        let id = peer_id(1);
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        let info = AddrInfo::new(id, vec![addr.clone()]);

        let peer = info.to_peer();
        let wire = Multiaddr::try_from(peer.multiaddresses[0].clone()).unwrap();
        assert_eq!(wire, addr.clone().with(Protocol::P2p(id)));

        assert_eq!(AddrInfo::from_peer(&peer).unwrap(), info);
    }

    #[test]
    fn foreign_suffix_is_kept() {
        let id = peer_id(1);
        let relay = peer_id(2);
        let addr: Multiaddr = format!("/ip4/10.0.0.1/tcp/1/p2p/{relay}").parse().unwrap();
        let peer = Peer {
            id: id.to_bytes(),
            multiaddresses: vec![addr.to_vec()],
        };
        assert_eq!(AddrInfo::from_peer(&peer).unwrap().addrs, vec![addr]);
    }

    #[test]
    fn malformed_address_drops_only_itself() {
        let id = peer_id(3);
        let good: Multiaddr = "/ip4/192.168.0.1/udp/9".parse().unwrap();
        let peer = Peer {
            id: id.to_bytes(),
            multiaddresses: vec![vec![0xff, 0xff, 0xff], good.to_vec()],
        };
        assert_eq!(AddrInfo::from_peer(&peer).unwrap().addrs, vec![good]);
    }

    #[test]
    fn invalid_peer_id_is_an_error() {
        let peer = Peer {
            id: vec![1, 2, 3],
            multiaddresses: vec![],
        };
        assert!(AddrInfo::from_peer(&peer).is_err());
    }
}
