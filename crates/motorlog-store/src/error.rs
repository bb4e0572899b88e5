//! Error types for the motorlog persistence layer

use thiserror::Error;

/// A stored document did not match its declared schema.
///
/// Carries the dotted path of the failing field together with a description
/// of the expected and the actual shape, so the message pinpoints the exact
/// mismatch (`specs.year: expected an integer, found a string`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode failed at `{path}`: expected {expected}, found {actual}")]
pub struct DecodeError {
    /// Dotted field path from the document root (e.g. `specs.year`).
    pub path: String,
    /// Description of the declared shape at that path.
    pub expected: String,
    /// Description of what the stored document actually held.
    pub actual: String,
}

impl DecodeError {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection failed or was lost
    #[error("database connection failed: {0}")]
    Connection(String),

    /// An underlying store operation failed (query, constraint violation)
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// Encoding a value into its stored form failed
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Lookup by identifier found nothing. Expected in normal control
    /// flow, not fatal.
    #[error("no document with id `{id}` in `{collection}`")]
    NotFound { collection: String, id: String },

    /// Lookup by file name found nothing in the blob store
    #[error("file not found: {file_name}")]
    FileNotFound { file_name: String },

    /// A stored document failed schema validation
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A fetched document failed schema validation; identifies which one
    #[error("document `{id}` in `{collection}` failed to decode: {source}")]
    DocumentDecode {
        collection: String,
        id: String,
        #[source]
        source: DecodeError,
    },

    /// A branded string was constructed from an empty value
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// I/O failure while producing or consuming a byte stream
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors raised by the migration engine. Fatal to startup: the process
/// must not begin serving traffic with partially-migrated data.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Two registered migrations share a name
    #[error("duplicate migration name: `{0}`")]
    DuplicateName(String),

    /// A migration's body failed; later migrations were not attempted
    #[error("migration `{name}` failed: {source}")]
    Step {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The applied-set could not be read or a completion record could
    /// not be written
    #[error("migration state error: {0}")]
    State(#[source] StoreError),
}
