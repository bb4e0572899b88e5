//! motorlog-store: typed document persistence
//!
//! This crate is the persistence layer for motorlog. It handles all I/O
//! with the document store and exposes four surfaces:
//!
//! - [`StoreHandle`]: connection lifecycle, acquired once at startup,
//!   passed explicitly, released at shutdown
//! - [`Collection`]: schema-bound CRUD over one physical collection,
//!   with every read and write passing through the declared codec
//! - [`Migrator`]: forward-only, idempotent application of a declared
//!   migration sequence, run before application traffic starts
//! - [`BlobStore`]: streaming storage for binary file content
//!
//! Application code never talks to the underlying store directly; it
//! goes through these handles.

mod blob;
mod collection;
mod error;
mod handle;
mod migrate;
pub mod schema;

pub use blob::{
    stream_from_bytes, BlobStore, ByteStream, ContentDigest, ContentType, FileName, StoredFile,
    StoredFileMeta, CHUNK_SIZE,
};
pub use collection::{Collection, DocumentId, Filter, Patch, Stored};
pub use error::{DecodeError, MigrationError, StoreError};
pub use handle::{StoreConfig, StoreHandle};
pub use migrate::{Migration, MigrationRecord, MigrationReport, MigrationStatus, Migrator};

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, StoreError>;
