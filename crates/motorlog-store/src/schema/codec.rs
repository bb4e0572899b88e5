//! Encode/decode between in-memory values and stored documents.
//!
//! `encode` never fails for a well-typed value; `decode` validates the
//! stored object against the declared shape before deserializing, so a
//! mismatch is reported with its field path rather than as an opaque serde
//! error. Undeclared keys in the stored object are ignored, since document
//! stores attach bookkeeping fields the schema does not know about.

use serde_json::Value;

use super::{Document, Shape, StructShape};
use crate::error::{DecodeError, StoreError};

/// The untyped tree of primitive values as persisted by the store.
pub type StoredDocument = serde_json::Map<String, Value>;

/// Encode a value into its stored-document form.
pub fn encode<T: Document>(value: &T) -> Result<StoredDocument, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "`{}` did not encode to an object (got {})",
            T::shape().name,
            json_type(&other),
        ))),
    }
}

/// Decode a stored document back into its typed value.
///
/// Fails fast with the first shape mismatch, in field declaration order.
pub fn decode<T: Document>(doc: &StoredDocument) -> Result<T, DecodeError> {
    validate_struct(&T::shape(), doc, &mut Vec::new())?;
    serde_json::from_value(Value::Object(doc.clone())).map_err(|err| {
        // Shape validation passed, so this only fires if the declared
        // shape and the serde representation have drifted apart.
        DecodeError::new("", T::shape().describe_mismatch(), err.to_string())
    })
}

/// Validate an arbitrary value against a shape, without deserializing.
/// Used by patch and filter validation.
pub fn validate_value(shape: &Shape, value: &Value, path: &str) -> Result<(), DecodeError> {
    let mut segments: Vec<String> = if path.is_empty() {
        Vec::new()
    } else {
        vec![path.to_string()]
    };
    validate(shape, value, &mut segments)
}

impl StructShape {
    fn describe_mismatch(&self) -> String {
        format!("a `{}` object", self.name)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn joined(path: &[String]) -> String {
    path.join(".")
}

fn mismatch(shape: &Shape, value: &Value, path: &[String]) -> DecodeError {
    DecodeError::new(joined(path), shape.describe(), json_type(value))
}

fn validate(shape: &Shape, value: &Value, path: &mut Vec<String>) -> Result<(), DecodeError> {
    match shape {
        Shape::String => match value {
            Value::String(_) => Ok(()),
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Float => match value {
            Value::Number(_) => Ok(()),
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Bool => match value {
            Value::Bool(_) => Ok(()),
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Timestamp => match value {
            Value::String(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => Ok(()),
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Optional(inner) => match value {
            Value::Null => Ok(()),
            other => validate(inner, other, path),
        },
        Shape::Array(element) => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(format!("[{i}]"));
                    validate(element, item, path)?;
                    path.pop();
                }
                Ok(())
            }
            other => Err(mismatch(shape, other, path)),
        },
        Shape::Struct(s) => match value {
            Value::Object(map) => validate_struct(s, map, path),
            other => Err(mismatch(shape, other, path)),
        },
    }
}

fn validate_struct(
    shape: &StructShape,
    doc: &StoredDocument,
    path: &mut Vec<String>,
) -> Result<(), DecodeError> {
    for field in &shape.fields {
        match doc.get(field.name) {
            Some(value) => {
                path.push(field.name.to_string());
                validate(&field.shape, value, path)?;
                path.pop();
            }
            None => {
                // A missing key is only acceptable for optional fields.
                if !matches!(field.shape, Shape::Optional(_)) {
                    path.push(field.name.to_string());
                    let err =
                        DecodeError::new(joined(path), field.shape.describe(), "a missing field");
                    path.pop();
                    return Err(err);
                }
            }
        }
    }
    Ok(())
}
