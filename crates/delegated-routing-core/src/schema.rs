//! Typed views over [`Node`] values.
//!
//! Structs are maps with one entry per field. Unions are maps with exactly
//! one entry whose key names the variant. The helpers here are the building
//! blocks the protocol types in [`crate::proto`] are written with.

use crate::error::SchemaError;
use crate::node::{Kind, Node};
use cid::Cid;

/// A protocol type with a data-model representation.
pub trait Schema: Sized {
    /// Read the value as a node.
    fn to_node(&self) -> Node;

    /// Parse and validate a node into the typed value.
    fn parse(node: &Node) -> Result<Self, SchemaError>;
}

fn wrong_kind(type_name: &'static str, expected: Kind, node: &Node) -> SchemaError {
    SchemaError::WrongKind {
        type_name,
        expected,
        found: node.kind(),
    }
}

impl Schema for bool {
    fn to_node(&self) -> Node {
        Node::Bool(*self)
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        match node {
            Node::Bool(v) => Ok(*v),
            other => Err(wrong_kind("Bool", Kind::Bool, other)),
        }
    }
}

impl Schema for i64 {
    fn to_node(&self) -> Node {
        Node::Int(*self)
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        match node {
            Node::Int(v) => Ok(*v),
            other => Err(wrong_kind("Int", Kind::Int, other)),
        }
    }
}

impl Schema for String {
    fn to_node(&self) -> Node {
        Node::String(self.clone())
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        match node {
            Node::String(v) => Ok(v.clone()),
            other => Err(wrong_kind("String", Kind::String, other)),
        }
    }
}

impl Schema for Vec<u8> {
    fn to_node(&self) -> Node {
        Node::Bytes(self.clone())
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        match node {
            Node::Bytes(v) => Ok(v.clone()),
            other => Err(wrong_kind("Bytes", Kind::Bytes, other)),
        }
    }
}

impl Schema for Cid {
    fn to_node(&self) -> Node {
        Node::Link(*self)
    }

    fn parse(node: &Node) -> Result<Self, SchemaError> {
        match node {
            Node::Link(v) => Ok(*v),
            other => Err(wrong_kind("Link", Kind::Link, other)),
        }
    }
}

/// Entries of a struct-typed node.
pub fn struct_entries<'a>(
    type_name: &'static str,
    node: &'a Node,
) -> Result<&'a [(String, Node)], SchemaError> {
    node.entries()
        .ok_or_else(|| wrong_kind(type_name, Kind::Map, node))
}

/// Fill a field slot, rejecting a key that was already seen.
pub fn set_field<T>(
    type_name: &'static str,
    slot: &mut Option<T>,
    key: &str,
    parse: impl FnOnce() -> Result<T, SchemaError>,
) -> Result<(), SchemaError> {
    if slot.is_some() {
        return Err(SchemaError::DuplicateField {
            type_name,
            field: key.to_string(),
        });
    }
    *slot = Some(parse()?);
    Ok(())
}

/// Take a required field out of its slot.
pub fn required<T>(
    type_name: &'static str,
    field: &'static str,
    slot: Option<T>,
) -> Result<T, SchemaError> {
    slot.ok_or(SchemaError::MissingField { type_name, field })
}

/// Error for a field the type does not declare.
pub fn unknown_field(type_name: &'static str, key: &str) -> SchemaError {
    SchemaError::UnknownField {
        type_name,
        field: key.to_string(),
    }
}

/// The selecting entry of a union-typed node.
///
/// Only the first entry is consulted.
pub fn union_entry<'a>(
    type_name: &'static str,
    node: &'a Node,
) -> Result<(&'a str, &'a Node), SchemaError> {
    let entries = node
        .entries()
        .ok_or_else(|| wrong_kind(type_name, Kind::Map, node))?;
    let (key, value) = entries
        .first()
        .ok_or(SchemaError::EmptyUnion { type_name })?;
    if entries.len() > 1 {
        tracing::debug!(type_name, extra = entries.len() - 1, "ignoring extra union keys");
    }
    Ok((key.as_str(), value))
}

/// A single-entry map node, the representation of a union value.
pub fn union_node(tag: impl Into<String>, value: Node) -> Node {
    Node::Map(vec![(tag.into(), value)])
}

/// Parse every item of a list node as `T`.
pub fn parse_list<T: Schema>(type_name: &'static str, node: &Node) -> Result<Vec<T>, SchemaError> {
    node.items()
        .ok_or_else(|| wrong_kind(type_name, Kind::List, node))?
        .iter()
        .map(T::parse)
        .collect()
}

/// A list node of encoded items.
pub fn list_node<T: Schema>(items: &[T]) -> Node {
    Node::List(items.iter().map(Schema::to_node).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_rejects_repeat() {
        let mut slot = None;
        set_field("T", &mut slot, "A", || Ok(1)).unwrap();
        let err = set_field("T", &mut slot, "A", || Ok(2)).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
        assert_eq!(slot, Some(1));
    }

    #[test]
    fn union_entry_requires_a_key() {
        let err = union_entry("U", &Node::Map(vec![])).unwrap_err();
        assert_eq!(err, SchemaError::EmptyUnion { type_name: "U" });

        let err = union_entry("U", &Node::Int(3)).unwrap_err();
        assert!(matches!(err, SchemaError::WrongKind { expected: Kind::Map, .. }));
    }

    #[test]
    fn list_elements_must_match() {
        let node = Node::List(vec![Node::Bytes(vec![1]), Node::Int(2)]);
        assert!(parse_list::<Vec<u8>>("List", &node).is_err());

        let node = Node::List(vec![Node::Bytes(vec![1]), Node::Bytes(vec![2])]);
        let parsed: Vec<Vec<u8>> = parse_list("List", &node).unwrap();
        assert_eq!(parsed, vec![vec![1], vec![2]]);
    }
}
