//! Core types for delegated content routing.
//!
//! This crate provides the protocol primitives: a self-describing data model,
//! its DAG-JSON encoding, the typed request/response values and the envelopes
//! that multiplex them. Transports live in the client and server crates.

pub mod codec;
mod addr;
mod envelope;
mod error;
mod node;
pub mod proto;
pub mod schema;

pub use addr::AddrInfo;
pub use envelope::{
    Call, Method, MethodParseError, REQUEST_ENVELOPE, RESPONSE_ENVELOPE, Request, Response,
    ResponseDecoder, decode_request, decode_stream, encode_call, encode_response_line,
};
pub use error::{DecodeError, FramingError, SchemaError, VerifyError};
pub use node::{Kind, Node};
pub use proto::{
    BitswapProtocol, FindProvidersRequest, FindProvidersResponse, GetIpnsRequest, GetIpnsResponse,
    GraphSyncFilv1, IdentifyRequest, IdentifyResponse, Peer, ProvideRequest, ProvideResponse,
    Provider, ProviderNode, PutIpnsRequest, PutIpnsResponse, ServiceError, TransferProtocol,
};
pub use schema::Schema;

pub use cid::Cid;
pub use libp2p_identity::PeerId;
pub use multiaddr::Multiaddr;

/// Content type of request and response bodies.
pub const CONTENT_TYPE: &str = "application/vnd.ipfs.http+dag-json; version=1";

/// URL query parameter carrying an encoded request.
pub const QUERY_PARAM: &str = "q";
