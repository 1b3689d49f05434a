//! DAG-JSON byte codec.
//!
//! Bytes are written as `{"/":{"bytes":"<base64>"}}` and links as
//! `{"/":"<cid>"}`; everything else maps onto plain JSON. Values can be
//! decoded back to back from one continuous byte sequence with
//! [`StreamDecoder`].

use crate::error::FramingError;
use crate::node::Node;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::{Buf, BytesMut};
use cid::Cid;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Unpadded standard base64; padded input is accepted too.
pub const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const RESERVED_KEY: &str = "/";
const BYTES_KEY: &str = "bytes";

/// Encode a node as one DAG-JSON document.
pub fn encode(node: &Node) -> Result<Vec<u8>, FramingError> {
    serde_json::to_vec(node).map_err(FramingError::Encode)
}

/// Decode exactly one DAG-JSON document; trailing whitespace is allowed.
pub fn decode(bytes: &[u8]) -> Result<Node, FramingError> {
    serde_json::from_slice(bytes).map_err(FramingError::Malformed)
}

/// Incremental decoder for back-to-back values.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
}

impl StreamDecoder {
    /// An empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete value, or `None` if more bytes are needed.
    pub fn next_node(&mut self) -> Result<Option<Node>, FramingError> {
        let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Node>();
        match values.next() {
            None => {
                self.buf.clear();
                Ok(None)
            }
            Some(Ok(node)) => {
                let used = values.byte_offset();
                self.buf.advance(used);
                Ok(Some(node))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(FramingError::Malformed(e)),
        }
    }

    /// Call once the transport reached end of stream.
    ///
    /// Returns the last value if the final document lacked a trailing
    /// newline, and reports any incomplete remainder as truncation.
    pub fn finish(&mut self) -> Result<Option<Node>, FramingError> {
        if let Some(node) = self.next_node()? {
            return Ok(Some(node));
        }
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            Ok(None)
        } else {
            Err(FramingError::Truncated(self.buf.len()))
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(v) => serializer.serialize_bool(*v),
            Node::Int(v) => serializer.serialize_i64(*v),
            Node::Float(v) => serializer.serialize_f64(*v),
            Node::String(v) => serializer.serialize_str(v),
            Node::Bytes(v) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(RESERVED_KEY, &BytesForm(v))?;
                map.end()
            }
            Node::Link(cid) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(RESERVED_KEY, &cid.to_string())?;
                map.end()
            }
            Node::List(items) => serializer.collect_seq(items),
            Node::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct BytesForm<'a>(&'a [u8]);

impl Serialize for BytesForm<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(BYTES_KEY, &BASE64.encode(self.0))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a DAG-JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        i64::try_from(v)
            .map(Node::Int)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries: Vec<(String, Node)> = Vec::new();
        while let Some(entry) = map.next_entry::<String, Node>()? {
            entries.push(entry);
        }
        reserved_form(entries).map_err(de::Error::custom)
    }
}

/// Recognise the `{"/": ...}` link and bytes forms.
fn reserved_form(entries: Vec<(String, Node)>) -> Result<Node, String> {
    let [(key, value)] = entries.as_slice() else {
        return Ok(Node::Map(entries));
    };
    if key != RESERVED_KEY {
        return Ok(Node::Map(entries));
    }
    match value {
        Node::String(s) => Cid::try_from(s.as_str())
            .map(Node::Link)
            .map_err(|e| format!("invalid link {s:?}: {e}")),
        Node::Map(inner) => match inner.as_slice() {
            [(k, Node::String(encoded))] if k == BYTES_KEY => BASE64
                .decode(encoded)
                .map(Node::Bytes)
                .map_err(|e| format!("invalid bytes: {e}")),
            _ => Ok(Node::Map(entries)),
        },
        _ => Ok(Node::Map(entries)),
    }
}
