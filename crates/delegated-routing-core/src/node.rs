//! Self-describing data model.
//!
//! Every protocol value can be read as a [`Node`] and parsed back from one.
//! Maps keep their entries in wire order, duplicates included, so that struct
//! parsing can reject repeated keys.

use cid::Cid;
use std::fmt;

/// The kind of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Link,
    List,
    Map,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Link => "link",
            Kind::List => "list",
            Kind::Map => "map",
        };
        f.write_str(name)
    }
}

/// A generic data-model value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Link(Cid),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    /// Build a map node from `(key, value)` pairs, preserving order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        Node::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The data-model kind of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Node::Null => Kind::Null,
            Node::Bool(_) => Kind::Bool,
            Node::Int(_) => Kind::Int,
            Node::Float(_) => Kind::Float,
            Node::String(_) => Kind::String,
            Node::Bytes(_) => Kind::Bytes,
            Node::Link(_) => Kind::Link,
            Node::List(_) => Kind::List,
            Node::Map(_) => Kind::Map,
        }
    }

    /// Look up the first map entry named `key`.
    pub fn lookup(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a list element by position.
    pub fn index(&self, idx: usize) -> Option<&Node> {
        match self {
            Node::List(items) => items.get(idx),
            _ => None,
        }
    }

    /// Number of entries (maps) or elements (lists); `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Node::Map(entries) => Some(entries.len()),
            Node::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Map entries in wire order, or `None` if this is not a map.
    pub fn entries(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// List elements, or `None` if this is not a list.
    pub fn items(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Int(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::String(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::String(v)
    }
}

impl From<Cid> for Node {
    fn from(v: Cid) -> Self {
        Node::Link(v)
    }
}
