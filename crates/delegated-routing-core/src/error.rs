//! Codec and schema errors.

use crate::node::Kind;

/// A node did not have the shape a protocol type expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{type_name}: expected {expected}, found {found}")]
    WrongKind {
        type_name: &'static str,
        expected: Kind,
        found: Kind,
    },
    #[error("{type_name}: missing field {field}")]
    MissingField {
        type_name: &'static str,
        field: &'static str,
    },
    #[error("{type_name}: field {field} already parsed")]
    DuplicateField {
        type_name: &'static str,
        field: String,
    },
    #[error("{type_name}: unknown field {field}")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },
    #[error("{type_name}: union map is empty")]
    EmptyUnion { type_name: &'static str },
    #[error("{type_name}: union map has no applicable key ({key})")]
    NoApplicableKey { type_name: &'static str, key: String },
    #[error("{type_name}: variant {key} is not valid in this direction")]
    UnexpectedVariant { type_name: &'static str, key: String },
}

/// Bytes could not be turned into data-model values.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("malformed value: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("stream ended inside a value ({0} bytes pending)")]
    Truncated(usize),
    #[error("encoding value: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decoding an envelope failed, either at the byte level or the schema level.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A provide request's signature could not be checked or did not match.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("provider is not a peer")]
    NotAPeer,
    #[error("invalid peer id: {0}")]
    PeerId(#[from] libp2p_identity::ParseError),
    #[error("peer id does not embed its public key")]
    KeyNotInlined,
    #[error("invalid public key: {0}")]
    Key(#[from] libp2p_identity::DecodingError),
    #[error(transparent)]
    Encode(#[from] FramingError),
    #[error("signature does not match")]
    BadSignature,
}
