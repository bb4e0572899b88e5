//! Declarative document schemas
//!
//! A schema is a value describing the shape of a stored document, kept
//! separate from the encode/decode functions that execute it. The
//! description can be introspected without running validation: patch and
//! filter checks in [`crate::collection`] and the tree rendering in the
//! backup pipeline both walk it.
//!
//! Shapes are immutable once shipped: changing a document's shape requires
//! a new migration, never an in-place reinterpretation of stored data.

mod codec;

pub use codec::{decode, encode, validate_value, StoredDocument};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The shape of a single stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// 64-bit float; integer values are accepted on decode
    Float,
    /// Boolean
    Bool,
    /// RFC 3339 timestamp, stored as a string
    Timestamp,
    /// Present-or-absent wrapper; `null` and a missing field both decode
    /// as absent
    Optional(Box<Shape>),
    /// Homogeneous ordered list
    Array(Box<Shape>),
    /// Nested struct
    Struct(StructShape),
}

impl Shape {
    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    pub fn array(element: Shape) -> Self {
        Shape::Array(Box::new(element))
    }

    /// Human-readable description, used in decode error messages.
    pub fn describe(&self) -> String {
        match self {
            Shape::String => "a string".to_string(),
            Shape::Int => "an integer".to_string(),
            Shape::Float => "a number".to_string(),
            Shape::Bool => "a boolean".to_string(),
            Shape::Timestamp => "an RFC 3339 timestamp".to_string(),
            Shape::Optional(inner) => format!("optional {}", inner.describe()),
            Shape::Array(element) => format!("an array of {}", element.describe()),
            Shape::Struct(s) => format!("a `{}` object", s.name),
        }
    }
}

/// One named field of a struct shape, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
}

impl Field {
    pub fn new(name: &'static str, shape: Shape) -> Self {
        Self { name, shape }
    }
}

/// The declared shape of a document: a named struct with ordered fields.
///
/// Validation walks fields in declaration order and fails fast on the
/// first mismatch, so error messages are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct StructShape {
    pub name: &'static str,
    pub fields: Vec<Field>,
}

impl StructShape {
    pub fn new(name: &'static str, fields: Vec<Field>) -> Self {
        Self { name, fields }
    }

    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A Rust type persisted as documents of one collection.
///
/// The declared shape must describe exactly the serde representation of
/// the type, so that `decode(encode(v)) == v` for every well-typed `v`.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Physical collection name this type is bound to.
    const COLLECTION: &'static str;

    /// The declared shape of one document.
    fn shape() -> StructShape;
}
