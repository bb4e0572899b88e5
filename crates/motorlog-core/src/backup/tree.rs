//! Generic tree node form for snapshots
//!
//! A snapshot is one tree of named nodes: the root names the snapshot
//! format, each document appears as a child node named after its table,
//! primitive fields become attributes, nested structures become child
//! nodes. The serialized form on disk is this structure written with
//! serde; anything that can produce the same parsed tree can be
//! restored from.

use std::collections::BTreeMap;

use motorlog_store::schema::{Shape, StoredDocument, StructShape};
use motorlog_store::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::BackupError;

/// One node in the snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Child nodes with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TreeNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_named(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Render one stored document as a tree node.
///
/// The document comes straight out of the codec, so a value that does
/// not fit its declared shape is a malformed snapshot in the making and
/// reported as such.
pub fn node_from_document(
    node_name: &str,
    shape: &StructShape,
    doc: &StoredDocument,
) -> Result<TreeNode, BackupError> {
    let mut node = TreeNode::new(node_name);
    render_struct(shape, doc, &mut node)?;
    Ok(node)
}

/// Rebuild a stored document from a tree node, checking each attribute
/// against the declared shape. Failures carry the field path, matching
/// the codec's reporting.
pub fn document_from_node(shape: &StructShape, node: &TreeNode) -> Result<StoredDocument, DecodeError> {
    let mut doc = StoredDocument::new();
    for field in &shape.fields {
        match parse_field(&field.shape, field.name, node)? {
            Some(value) => {
                doc.insert(field.name.to_string(), value);
            }
            None => {
                doc.insert(field.name.to_string(), Value::Null);
            }
        }
    }
    Ok(doc)
}

fn render_struct(
    shape: &StructShape,
    doc: &StoredDocument,
    node: &mut TreeNode,
) -> Result<(), BackupError> {
    for field in &shape.fields {
        let value = doc.get(field.name).unwrap_or(&Value::Null);
        render_field(&field.shape, field.name, value, node)?;
    }
    Ok(())
}

fn render_field(
    shape: &Shape,
    name: &str,
    value: &Value,
    node: &mut TreeNode,
) -> Result<(), BackupError> {
    match (shape, value) {
        // Absent optionals are simply omitted from the node.
        (Shape::Optional(_), Value::Null) => Ok(()),
        (Shape::Optional(inner), present) => render_field(inner, name, present, node),
        (Shape::Struct(inner), Value::Object(map)) => {
            let mut child = TreeNode::new(name);
            render_struct(inner, map, &mut child)?;
            node.children.push(child);
            Ok(())
        }
        (Shape::Array(element), Value::Array(items)) => {
            let mut list = TreeNode::new(name);
            for item in items {
                let mut entry = TreeNode::new("item");
                match (&**element, item) {
                    (Shape::Struct(inner), Value::Object(map)) => {
                        render_struct(inner, map, &mut entry)?
                    }
                    (_, primitive) => entry.text = Some(attr_text(primitive)?),
                }
                list.children.push(entry);
            }
            node.children.push(list);
            Ok(())
        }
        (_, primitive) => {
            node.attrs.insert(name.to_string(), attr_text(primitive)?);
            Ok(())
        }
    }
}

fn attr_text(value: &Value) -> Result<String, BackupError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(BackupError::Malformed(format!(
            "cannot render {other} as an attribute"
        ))),
    }
}

fn parse_field(shape: &Shape, name: &str, node: &TreeNode) -> Result<Option<Value>, DecodeError> {
    match shape {
        Shape::Optional(inner) => match parse_field(inner, name, node) {
            Ok(value) => Ok(value),
            // Absence is fine for an optional field.
            Err(err) if err.actual == "a missing attribute" || err.actual == "a missing child node" => {
                Ok(None)
            }
            Err(err) => Err(err),
        },
        Shape::Struct(inner) => {
            let child = node.child_named(name).ok_or_else(|| {
                DecodeError::new(name, shape.describe(), "a missing child node")
            })?;
            let doc = document_from_node(inner, child)
                .map_err(|e| DecodeError::new(format!("{name}.{}", e.path), e.expected, e.actual))?;
            Ok(Some(Value::Object(doc)))
        }
        Shape::Array(element) => {
            let Some(list) = node.child_named(name) else {
                return Err(DecodeError::new(name, shape.describe(), "a missing child node"));
            };
            let mut items = Vec::new();
            for (i, entry) in list.children.iter().enumerate() {
                let path = format!("{name}.[{i}]");
                let value = match &**element {
                    Shape::Struct(inner) => {
                        let doc = document_from_node(inner, entry).map_err(|e| {
                            DecodeError::new(format!("{path}.{}", e.path), e.expected, e.actual)
                        })?;
                        Value::Object(doc)
                    }
                    primitive => {
                        let text = entry.text.as_deref().ok_or_else(|| {
                            DecodeError::new(path.clone(), primitive.describe(), "a node without text")
                        })?;
                        parse_primitive(primitive, text, &path)?
                    }
                };
                items.push(value);
            }
            Ok(Some(Value::Array(items)))
        }
        primitive => {
            let raw = node.attr(name).ok_or_else(|| {
                DecodeError::new(name, primitive.describe(), "a missing attribute")
            })?;
            Ok(Some(parse_primitive(primitive, raw, name)?))
        }
    }
}

fn parse_primitive(shape: &Shape, raw: &str, path: &str) -> Result<Value, DecodeError> {
    let mismatch = || DecodeError::new(path, shape.describe(), format!("attribute `{raw}`"));
    match shape {
        Shape::String => Ok(Value::String(raw.to_string())),
        Shape::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch()),
        Shape::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(mismatch),
        Shape::Bool => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        Shape::Timestamp => {
            if chrono::DateTime::parse_from_rfc3339(raw).is_ok() {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(mismatch())
            }
        }
        // Optional/Array/Struct are handled by parse_field.
        other => Err(DecodeError::new(path, other.describe(), format!("attribute `{raw}`"))),
    }
}
