//! Typed collection handles
//!
//! A `Collection<T>` is a named, schema-bound view over a physical
//! collection. Application code never touches stored documents directly:
//! values pass through the codec on every read and write, and failures
//! come back as the typed errors in [`crate::error`].
//!
//! The store's native record operations are used throughout (keyed
//! create/select/delete, `MERGE` for partial updates), so concurrent
//! writers to disjoint fields never race through read-modify-write.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{DecodeError, StoreError};
use crate::schema::{self, Document, Shape, StoredDocument, StructShape};

/// Field the handle mirrors the record key into, so fetched documents
/// carry their identifier without exposing store internals.
const ID_FIELD: &str = "doc_id";

/// Identifier assigned to a document on insert.
///
/// Opaque to callers; the inner string is always non-empty. At rest and
/// in cross-document references it is a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub(crate) fn generate() -> Self {
        DocumentId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(StoreError::EmptyField {
                field: "document id",
            });
        }
        Ok(DocumentId(s))
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded document together with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: DocumentId,
    pub value: T,
}

/// Comparison operator for a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Lt,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Lt => "<",
        }
    }
}

/// A conjunction of conditions on declared fields, rendered with bound
/// parameters. Field names are checked against the schema before the
/// query is issued.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Op, Value)>,
    order_by: Option<(String, bool)>,
}

impl Filter {
    /// Match every document.
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), Op::Eq, value.into()));
        self
    }

    pub fn gt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), Op::Gt, value.into()));
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), Op::Lt, value.into()));
        self
    }

    /// Sort results by a declared field, ascending.
    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), true));
        self
    }

    /// Sort results by a declared field, descending.
    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), false));
        self
    }
}

/// Partial update: named fields to merge into a stored document.
///
/// Only the listed fields are written; the stored document is never read
/// back, modified, and rewritten wholesale.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    fields: StoredDocument,
}

impl Patch {
    pub fn new() -> Self {
        Patch::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Deserialize)]
struct CountRow {
    count: u64,
}

/// A typed, schema-bound view over one physical collection.
pub struct Collection<T: Document> {
    db: Surreal<Any>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(db: Surreal<Any>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    /// Collection name this handle is bound to.
    pub fn name(&self) -> &'static str {
        T::COLLECTION
    }

    /// Encode and insert a value, returning the assigned identifier.
    ///
    /// Underlying write failures (connection, constraint violations) are
    /// surfaced, never retried here; not every failure is safe to retry.
    #[instrument(skip_all, fields(collection = T::COLLECTION))]
    pub async fn insert(&self, value: &T) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        self.insert_with_id(&id, value).await?;
        Ok(id)
    }

    /// Insert under a caller-supplied identifier. Used by restore, which
    /// must preserve identifiers from the snapshot.
    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id))]
    pub async fn insert_with_id(&self, id: &DocumentId, value: &T) -> Result<(), StoreError> {
        let mut doc = schema::encode(value)?;
        doc.insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
        debug!("Inserting document");

        let mut response = self
            .db
            .query("CREATE type::thing($tb, $id) CONTENT $doc")
            .bind(("tb", T::COLLECTION))
            .bind(("id", id.as_str().to_string()))
            .bind(("doc", Value::Object(doc)))
            .await?;

        let created: Vec<Value> = response.take(0)?;
        if created.is_empty() {
            return Err(StoreError::Storage(format!(
                "insert into `{}` returned no document",
                T::COLLECTION
            )));
        }
        Ok(())
    }

    /// Fetch and decode one document by identifier.
    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id))]
    pub async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Stored<T>>, StoreError> {
        let mut response = self
            .db
            .query("SELECT * OMIT id FROM type::thing($tb, $id)")
            .bind(("tb", T::COLLECTION))
            .bind(("id", id.as_str().to_string()))
            .await?;

        let rows: Vec<Value> = response.take(0)?;
        rows.into_iter().next().map(|row| self.decode_row(row)).transpose()
    }

    /// Fetch and decode every document matching the filter.
    ///
    /// A decode failure on any single document fails the whole call with
    /// that document's identifier in the error; nothing is silently
    /// dropped.
    #[instrument(skip_all, fields(collection = T::COLLECTION))]
    pub async fn find_many(&self, filter: &Filter) -> Result<Vec<Stored<T>>, StoreError> {
        let shape = T::shape();
        let mut sql = String::from("SELECT * OMIT id FROM type::table($tb)");
        let mut binds: Vec<(String, Value)> = Vec::new();

        for (i, (field, op, value)) in filter.conditions.iter().enumerate() {
            let declared = shape
                .field(field)
                .ok_or_else(|| undeclared_field(&shape, field))?;
            schema::validate_value(&condition_shape(&declared.shape), value, field)?;

            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} {} $v{}", field, op.sql(), i));
            binds.push((format!("v{i}"), value.clone()));
        }

        match &filter.order_by {
            Some((field, ascending)) => {
                if shape.field(field).is_none() {
                    return Err(undeclared_field(&shape, field).into());
                }
                sql.push_str(&format!(
                    " ORDER BY {} {}",
                    field,
                    if *ascending { "ASC" } else { "DESC" }
                ));
            }
            // Deterministic order even without an explicit sort.
            None => sql.push_str(&format!(" ORDER BY {ID_FIELD} ASC")),
        }

        let mut query = self.db.query(sql).bind(("tb", T::COLLECTION));
        for (name, value) in binds {
            query = query.bind((name, value));
        }
        let mut response = query.await?;

        let rows: Vec<Value> = response.take(0)?;
        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }

    /// Fetch and decode every document in the collection.
    pub async fn all(&self) -> Result<Vec<Stored<T>>, StoreError> {
        self.find_many(&Filter::all()).await
    }

    /// Count documents matching the filter without decoding them.
    #[instrument(skip_all, fields(collection = T::COLLECTION))]
    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let shape = T::shape();
        let mut sql = String::from("SELECT count() FROM type::table($tb)");
        let mut binds: Vec<(String, Value)> = Vec::new();

        for (i, (field, op, value)) in filter.conditions.iter().enumerate() {
            if shape.field(field).is_none() {
                return Err(undeclared_field(&shape, field).into());
            }
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} {} $v{}", field, op.sql(), i));
            binds.push((format!("v{i}"), value.clone()));
        }
        sql.push_str(" GROUP ALL");

        let mut query = self.db.query(sql).bind(("tb", T::COLLECTION));
        for (name, value) in binds {
            query = query.bind((name, value));
        }
        let mut response = query.await?;

        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.count).unwrap_or(0))
    }

    /// Merge a partial update into one document using the store's native
    /// partial-update primitive, and return the updated document.
    ///
    /// Patch fields are validated against the declared shape before
    /// anything is written. Updating a missing identifier is a
    /// [`StoreError::NotFound`].
    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id))]
    pub async fn update_by_id(&self, id: &DocumentId, patch: Patch) -> Result<Stored<T>, StoreError> {
        let shape = T::shape();
        for (field, value) in &patch.fields {
            if field == ID_FIELD {
                return Err(DecodeError::new(
                    field.clone(),
                    format!("a declared field of `{}`", shape.name),
                    "the reserved identifier field",
                )
                .into());
            }
            let declared = shape
                .field(field)
                .ok_or_else(|| undeclared_field(&shape, field))?;
            schema::validate_value(&declared.shape, value, field)?;
        }

        debug!("Merging patch into document");
        let mut response = self
            .db
            .query("UPDATE type::thing($tb, $id) MERGE $patch RETURN AFTER")
            .bind(("tb", T::COLLECTION))
            .bind(("id", id.as_str().to_string()))
            .bind(("patch", Value::Object(patch.fields)))
            .await?;

        let rows: Vec<Value> = response.take(0)?;
        match rows.into_iter().next() {
            Some(row) => self.decode_row(row),
            None => Err(StoreError::NotFound {
                collection: T::COLLECTION.to_string(),
                id: id.as_str().to_string(),
            }),
        }
    }

    /// Delete one document by identifier. Deleting an absent identifier
    /// is a no-op success.
    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id))]
    pub async fn delete_by_id(&self, id: &DocumentId) -> Result<(), StoreError> {
        let response = self
            .db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", T::COLLECTION))
            .bind(("id", id.as_str().to_string()))
            .await?;

        response.check()?;
        Ok(())
    }

    fn decode_row(&self, row: Value) -> Result<Stored<T>, StoreError> {
        let mut doc = match row {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Storage(format!(
                    "`{}` returned a non-object row: {}",
                    T::COLLECTION,
                    other
                )))
            }
        };

        let id = match doc.remove(ID_FIELD) {
            Some(Value::String(s)) => DocumentId::try_from(s)?,
            _ => {
                return Err(StoreError::Storage(format!(
                    "document in `{}` has no `{ID_FIELD}` field",
                    T::COLLECTION
                )))
            }
        };

        let value = schema::decode(&doc).map_err(|source| StoreError::DocumentDecode {
            collection: T::COLLECTION.to_string(),
            id: id.as_str().to_string(),
            source,
        })?;

        Ok(Stored { id, value })
    }
}

fn undeclared_field(shape: &StructShape, field: &str) -> DecodeError {
    DecodeError::new(
        field,
        format!("a declared field of `{}`", shape.name),
        "an undeclared field",
    )
}

/// Filters compare against the payload of a field: a condition on an
/// optional field compares against the inner value, never against null.
fn condition_shape(declared: &Shape) -> Shape {
    match declared {
        Shape::Optional(inner) => (**inner).clone(),
        other => other.clone(),
    }
}
