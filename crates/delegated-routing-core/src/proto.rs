//! Protocol request and response types.
//!
//! Wire names follow the protocol (`"Key"`, `"Providers"`, `"2304"`, ...).
//! Request-side structs reject unknown fields; response-side structs skip
//! them so older clients keep working against newer servers.

use crate::error::{FramingError, SchemaError, VerifyError};
use crate::node::Node;
use crate::schema::{
    Schema, list_node, parse_list, required, set_field, struct_entries, union_entry, union_node,
    unknown_field,
};
use cid::Cid;
use libp2p_identity::{PeerId, PublicKey};

/// Transfer protocol tag for bitswap.
pub const BITSWAP_TAG: &str = "2304";
/// Transfer protocol tag for graphsync over filecoin, v1.
pub const GRAPHSYNC_FILV1_TAG: &str = "2320";
/// Node tag for a libp2p peer.
pub const PEER_TAG: &str = "peer";

const IDENTITY_MULTIHASH: u64 = 0x00;

macro_rules! field_codec {
    (parse list, $type_name:expr, $value:expr) => {
        parse_list($type_name, $value)
    };
    (parse, $type_name:expr, $value:expr) => {
        Schema::parse($value)
    };
    (node list, $field:expr) => {
        list_node($field)
    };
    (node, $field:expr) => {
        Schema::to_node($field)
    };
}

macro_rules! unknown_key {
    (strict, $type_name:expr, $key:expr) => {
        return Err(unknown_field($type_name, $key))
    };
    (tolerant, $type_name:expr, $key:expr) => {
        tracing::trace!(type_name = $type_name, field = $key, "skipping unknown field")
    };
}

/// Declare a struct type together with its map representation.
///
/// Fields are written `name: Type = "WireName"`, with a trailing `as list`
/// for list-typed fields.
macro_rules! schema_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ($mode:ident) {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident : $ty:ty = $wire:literal $(as $codec:ident)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl Schema for $name {
            fn to_node(&self) -> Node {
                Node::Map(vec![
                    $(($wire.to_string(), field_codec!(node $($codec)?, &self.$field)),)*
                ])
            }

            #[allow(unused_variables, unused_mut)]
            fn parse(node: &Node) -> Result<Self, SchemaError> {
                const TYPE_NAME: &str = stringify!($name);
                $(let mut $field: Option<$ty> = None;)*
                for (key, value) in struct_entries(TYPE_NAME, node)? {
                    match key.as_str() {
                        $($wire => set_field(TYPE_NAME, &mut $field, key, || {
                            field_codec!(parse $($codec)?, TYPE_NAME, value)
                        })?,)*
                        other => unknown_key!($mode, TYPE_NAME, other),
                    }
                }
                Ok(Self {
                    $($field: required(TYPE_NAME, $wire, $field)?,)*
                })
            }
        }
    };
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct IdentifyRequest (strict) {}
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct IdentifyResponse (tolerant) {
        /// Names of the methods the service answers.
        pub methods: Vec<String> = "Methods" as list,
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FindProvidersRequest (strict) {
        pub key: Cid = "Key",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct FindProvidersResponse (tolerant) {
        pub providers: Vec<Provider> = "Providers" as list,
    }
}

schema_struct! {
    /// A node that holds content, and the ways it can be fetched.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Provider (tolerant) {
        pub node: ProviderNode = "Node",
        pub proto: Vec<TransferProtocol> = "Proto" as list,
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct Peer (tolerant) {
        /// Binary peer id.
        pub id: Vec<u8> = "ID",
        /// Binary multiaddresses.
        pub multiaddresses: Vec<Vec<u8>> = "Multiaddresses" as list,
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct BitswapProtocol (tolerant) {}
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct GraphSyncFilv1 (tolerant) {
        pub piece_cid: Cid = "PieceCID",
        pub verified_deal: bool = "VerifiedDeal",
        pub fast_retrieval: bool = "FastRetrieval",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct GetIpnsRequest (strict) {
        pub id: Vec<u8> = "ID",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct GetIpnsResponse (tolerant) {
        pub record: Vec<u8> = "Record",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PutIpnsRequest (strict) {
        pub id: Vec<u8> = "ID",
        pub record: Vec<u8> = "Record",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct PutIpnsResponse (tolerant) {}
}

schema_struct! {
    /// Announcement that `provider` holds the content behind `keys`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ProvideRequest (strict) {
        pub keys: Vec<Cid> = "Key" as list,
        pub provider: Provider = "Provider",
        /// Unix milliseconds.
        pub timestamp: i64 = "Timestamp",
        /// Requested record lifetime in milliseconds.
        pub advisory_ttl: i64 = "AdvisoryTTL",
        pub signature: Vec<u8> = "Signature",
    }
}

schema_struct! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ProvideResponse (tolerant) {
        /// Lifetime granted by the service, in milliseconds.
        pub advisory_ttl: i64 = "AdvisoryTTL",
    }
}

schema_struct! {
    /// Error reported by the remote service.
    ///
    /// Codes are short and drawn from a small set so they can be used as
    /// labels.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("service error: {code}")]
    pub struct ServiceError (tolerant) {
        pub code: String = "Code",
    }
}

impl ServiceError {
    /// An error carrying `code` as its message.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl ProvideRequest {
    /// Bytes covered by the signature: the encoded request with an empty
    /// signature field.
    pub fn signing_payload(&self) -> Result<Vec<u8>, FramingError> {
        let unsigned = Self {
            signature: Vec::new(),
            ..self.clone()
        };
        crate::codec::encode(&unsigned.to_node())
    }

    /// Check the signature against the public key inlined in the
    /// provider's peer id, returning that peer id.
    pub fn verify(&self) -> Result<PeerId, VerifyError> {
        let ProviderNode::Peer(peer) = &self.provider.node else {
            return Err(VerifyError::NotAPeer);
        };
        let id = PeerId::from_bytes(&peer.id)?;
        let multihash = id.as_ref();
        if multihash.code() != IDENTITY_MULTIHASH {
            return Err(VerifyError::KeyNotInlined);
        }
        let key = PublicKey::try_decode_protobuf(multihash.digest())?;
        if key.verify(&self.signing_payload()?, &self.signature) {
            Ok(id)
        } else {
            Err(VerifyError::BadSignature)
        }
    }
}

/// Description of a provider node.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderNode {
    Peer(Peer),
    /// A node description this version does not know.
    Unknown { tag: String, value: Node },
}

impl Schema for ProviderNode {
    fn to_node(&self) -> Node {
        match self {
            ProviderNode::Peer(peer) => union_node(PEER_TAG, peer.to_node()),
            ProviderNode::Unknown { tag, value } => union_node(tag.clone(), value.clone()),
        }
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        let (tag, value) = union_entry("Node", node)?;
        match tag {
            PEER_TAG => Ok(ProviderNode::Peer(Peer::parse(value)?)),
            _ => Ok(ProviderNode::Unknown {
                tag: tag.to_string(),
                value: value.clone(),
            }),
        }
    }
}

/// A way of fetching content from a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferProtocol {
    Bitswap,
    GraphSyncFilv1(GraphSyncFilv1),
    Unknown { tag: String, value: Node },
}

impl TransferProtocol {
    /// The wire tag of this protocol.
    pub fn tag(&self) -> &str {
        match self {
            TransferProtocol::Bitswap => BITSWAP_TAG,
            TransferProtocol::GraphSyncFilv1(_) => GRAPHSYNC_FILV1_TAG,
            TransferProtocol::Unknown { tag, .. } => tag.as_str(),
        }
    }
}

impl Schema for TransferProtocol {
    fn to_node(&self) -> Node {
        match self {
            TransferProtocol::Bitswap => union_node(BITSWAP_TAG, BitswapProtocol {}.to_node()),
            TransferProtocol::GraphSyncFilv1(params) => {
                union_node(GRAPHSYNC_FILV1_TAG, params.to_node())
            }
            TransferProtocol::Unknown { tag, value } => union_node(tag.clone(), value.clone()),
        }
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        let (tag, value) = union_entry("TransferProtocol", node)?;
        match tag {
            BITSWAP_TAG => {
                BitswapProtocol::parse(value)?;
                Ok(TransferProtocol::Bitswap)
            }
            GRAPHSYNC_FILV1_TAG => Ok(TransferProtocol::GraphSyncFilv1(GraphSyncFilv1::parse(
                value,
            )?)),
            _ => Ok(TransferProtocol::Unknown {
                tag: tag.to_string(),
                value: value.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use multihash::Multihash;

    fn test_cid() -> Cid {
        Cid::new_v1(0x55, Multihash::<64>::wrap(0x00, b"test").unwrap())
    }

    fn sample_provider() -> Provider {
        Provider {
            node: ProviderNode::Peer(Peer {
                id: vec![0x12, 0x20, 1, 2, 3],
                multiaddresses: vec![vec![4, 127, 0, 0, 1]],
            }),
            proto: vec![
                TransferProtocol::Bitswap,
                TransferProtocol::GraphSyncFilv1(GraphSyncFilv1 {
                    piece_cid: test_cid(),
                    verified_deal: true,
                    fast_retrieval: false,
                }),
            ],
        }
    }

    #[test]
    fn provider_round_trips() {
        let provider = sample_provider();
        assert_eq!(Provider::parse(&provider.to_node()).unwrap(), provider);

        let response = FindProvidersResponse {
            providers: vec![provider.clone(), provider],
        };
        let bytes = codec::encode(&response.to_node()).unwrap();
        let parsed = FindProvidersResponse::parse(&codec::decode(&bytes).unwrap()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn wire_names_are_used() {
        let node = FindProvidersRequest { key: test_cid() }.to_node();
        assert!(node.lookup("Key").is_some());

        let node = TransferProtocol::Bitswap.to_node();
        assert_eq!(node, Node::map([("2304", Node::Map(vec![]))]));
    }

    #[test]
    fn unknown_transfer_protocol_is_captured() {
        let node = Node::map([("9999", Node::map([("x", Node::Int(1))]))]);
        let parsed = TransferProtocol::parse(&node).unwrap();
        assert_eq!(
            parsed,
            TransferProtocol::Unknown {
                tag: "9999".into(),
                value: Node::map([("x", Node::Int(1))]),
            }
        );
        assert_eq!(parsed.tag(), "9999");
        assert_eq!(parsed.to_node(), node);
    }

    #[test]
    fn unknown_node_description_is_captured() {
        let node = Node::map([("carrier-pigeon", Node::from("coop 7"))]);
        let parsed = ProviderNode::parse(&node).unwrap();
        assert!(matches!(parsed, ProviderNode::Unknown { ref tag, .. } if tag == "carrier-pigeon"));
    }

    #[test]
    fn missing_field_is_reported() {
        let node = Node::map([("ID", Node::Bytes(vec![1]))]);
        let err = PutIpnsRequest::parse(&node).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                type_name: "PutIpnsRequest",
                field: "Record",
            }
        );
    }

    #[test]
    fn repeated_field_is_rejected() {
        let node = Node::map([("Code", Node::from("a")), ("Code", Node::from("b"))]);
        let err = ServiceError::parse(&node).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn requests_are_strict_responses_tolerant() {
        let node = Node::map([("ID", Node::Bytes(vec![1])), ("Extra", Node::Null)]);
        assert!(matches!(
            GetIpnsRequest::parse(&node),
            Err(SchemaError::UnknownField { .. })
        ));

        let node = Node::map([("Record", Node::Bytes(vec![1])), ("Extra", Node::Null)]);
        assert_eq!(
            GetIpnsResponse::parse(&node).unwrap(),
            GetIpnsResponse { record: vec![1] }
        );
    }

    #[test]
    fn wrong_field_kind_is_rejected() {
        let node = Node::map([("Key", Node::from("not a link"))]);
        assert!(matches!(
            FindProvidersRequest::parse(&node),
            Err(SchemaError::WrongKind { .. })
        ));
    }

    #[test]
    fn signing_payload_ignores_signature() {
        let mut request = ProvideRequest {
            keys: vec![test_cid()],
            provider: sample_provider(),
            timestamp: 1_000,
            advisory_ttl: 3_600_000,
            signature: Vec::new(),
        };
        let unsigned = request.signing_payload().unwrap();
        request.signature = vec![9; 64];
        assert_eq!(request.signing_payload().unwrap(), unsigned);
        assert_eq!(ProvideRequest::parse(&request.to_node()).unwrap(), request);
    }

    #[test]
    fn signature_verifies_against_inlined_key() {
        let keypair = libp2p_identity::Keypair::generate_ed25519();
        let id = keypair.public().to_peer_id();
        let mut request = ProvideRequest {
            keys: vec![test_cid()],
            provider: Provider {
                node: ProviderNode::Peer(Peer {
                    id: id.to_bytes(),
                    multiaddresses: vec![],
                }),
                proto: vec![TransferProtocol::Bitswap],
            },
            timestamp: 1_000,
            advisory_ttl: 60_000,
            signature: Vec::new(),
        };
        assert!(matches!(request.verify(), Err(VerifyError::BadSignature)));

        request.signature = keypair.sign(&request.signing_payload().unwrap()).unwrap();
        assert_eq!(request.verify().unwrap(), id);

        request.timestamp += 1;
        assert!(matches!(request.verify(), Err(VerifyError::BadSignature)));
    }

    #[test]
    fn hashed_peer_id_cannot_verify() {
        let mut request = ProvideRequest {
            keys: vec![],
            provider: sample_provider(),
            timestamp: 0,
            advisory_ttl: 0,
            signature: vec![],
        };
        let mut id = vec![0x12, 0x20];
        id.extend([7u8; 32]);
        request.provider.node = ProviderNode::Peer(Peer {
            id,
            multiaddresses: vec![],
        });
        assert!(matches!(request.verify(), Err(VerifyError::KeyNotInlined)));
    }
}
