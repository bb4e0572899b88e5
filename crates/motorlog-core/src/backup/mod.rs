//! Backup and restore
//!
//! A snapshot is a directory: `snapshot.json` holds the tree of all
//! structured documents, and each referenced photo's binary content sits
//! next to it as a file named exactly as the document references it.
//!
//! Export reads from a live database and is authoritative; import
//! validates: every referenced artifact must exist before a single
//! document is written, and a decode failure aborts rather than
//! continuing with corrupted data.

mod export;
mod import;
mod tree;

pub use export::{export_snapshot, ExportReport};
pub use import::{import_snapshot, ImportReport};
pub use tree::{document_from_node, node_from_document, TreeNode};

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::io::AsyncReadExt;

use motorlog_store::schema::{self, Document};
use motorlog_store::{ByteStream, DecodeError, DocumentId, Filter, StoreError, StoreHandle};

use crate::model::{FillUp, Photo, Vehicle, VehicleEvent};

/// Root node name; doubles as the snapshot format marker.
const ROOT_NODE: &str = "motorlog";
/// Name of the serialized tree inside a snapshot directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Errors from the backup/restore pipeline.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The snapshot references a file artifact that is not present.
    /// Fatal to the whole import; nothing is written.
    #[error("missing backup file: {file_name}")]
    MissingBackupFile { file_name: String },

    /// Import refuses to write into a database that already holds
    /// documents.
    #[error("import target is not empty: collection `{collection}` holds {count} document(s)")]
    TargetNotEmpty { collection: &'static str, count: u64 },

    /// The snapshot tree could not be read or has the wrong structure.
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// A snapshot node failed to decode into its collection's schema.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing snapshot artifacts failed.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a collection's nodes reference blob artifacts.
#[derive(Debug, Clone, Copy)]
struct FileRef {
    /// Attribute holding the referenced file name.
    name_attr: &'static str,
    /// Attribute holding the content type to restore the blob with.
    content_type_attr: &'static str,
}

/// One collection's contribution to a snapshot: how to render its
/// documents into tree nodes and back. The registry below is a fixed,
/// declared order, like the migration list.
pub struct CollectionSpec {
    name: &'static str,
    export: for<'a> fn(&'a StoreHandle) -> BoxFuture<'a, Result<Vec<TreeNode>, BackupError>>,
    import: for<'a> fn(&'a StoreHandle, &'a TreeNode) -> BoxFuture<'a, Result<(), BackupError>>,
    count: for<'a> fn(&'a StoreHandle) -> BoxFuture<'a, Result<u64, BackupError>>,
    file_ref: Option<FileRef>,
}

impl CollectionSpec {
    fn of<T: Document>() -> Self {
        Self {
            name: T::COLLECTION,
            export: export_boxed::<T>,
            import: import_boxed::<T>,
            count: count_boxed::<T>,
            file_ref: None,
        }
    }

    fn with_file_ref(mut self, name_attr: &'static str, content_type_attr: &'static str) -> Self {
        self.file_ref = Some(FileRef {
            name_attr,
            content_type_attr,
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Every collection included in snapshots, in export order.
pub fn collection_specs() -> Vec<CollectionSpec> {
    vec![
        CollectionSpec::of::<Vehicle>(),
        CollectionSpec::of::<FillUp>(),
        CollectionSpec::of::<VehicleEvent>(),
        CollectionSpec::of::<Photo>().with_file_ref("file_name", "content_type"),
    ]
}

const ID_ATTR: &str = "doc_id";

fn export_boxed<T: Document>(
    db: &StoreHandle,
) -> BoxFuture<'_, Result<Vec<TreeNode>, BackupError>> {
    Box::pin(export_collection::<T>(db))
}

fn import_boxed<'a, T: Document>(
    db: &'a StoreHandle,
    node: &'a TreeNode,
) -> BoxFuture<'a, Result<(), BackupError>> {
    Box::pin(import_node::<T>(db, node))
}

fn count_boxed<T: Document>(db: &StoreHandle) -> BoxFuture<'_, Result<u64, BackupError>> {
    Box::pin(count_collection::<T>(db))
}

async fn export_collection<T: Document>(db: &StoreHandle) -> Result<Vec<TreeNode>, BackupError> {
    let stored = db.collection::<T>().all().await?;
    let shape = T::shape();
    stored
        .into_iter()
        .map(|s| {
            let doc = schema::encode(&s.value)?;
            let node = node_from_document(T::COLLECTION, &shape, &doc)?;
            Ok(node.with_attr(ID_ATTR, s.id.as_str()))
        })
        .collect()
}

async fn import_node<T: Document>(db: &StoreHandle, node: &TreeNode) -> Result<(), BackupError> {
    let id = node.attr(ID_ATTR).ok_or_else(|| {
        BackupError::Malformed(format!(
            "`{}` node has no `{ID_ATTR}` attribute",
            T::COLLECTION
        ))
    })?;
    let id = DocumentId::try_from(id.to_string()).map_err(BackupError::Store)?;

    let doc = document_from_node(&T::shape(), node)?;
    let value: T = schema::decode(&doc)?;
    db.collection::<T>().insert_with_id(&id, &value).await?;
    Ok(())
}

async fn count_collection<T: Document>(db: &StoreHandle) -> Result<u64, BackupError> {
    Ok(db.collection::<T>().count(&Filter::all()).await?)
}

/// Resolve an artifact path inside the snapshot directory, rejecting
/// names that would escape it.
fn artifact_path(dir: &Path, file_name: &str) -> Result<PathBuf, BackupError> {
    if file_name.contains('/') || file_name.contains('\\') || file_name == ".." {
        return Err(BackupError::Malformed(format!(
            "artifact name `{file_name}` contains a path separator"
        )));
    }
    Ok(dir.join(file_name))
}

/// Stream a snapshot artifact from disk without materializing it.
fn file_stream(file: tokio::fs::File) -> ByteStream {
    const READ_SIZE: usize = 64 * 1024;
    stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(READ_SIZE);
        let read = file.read_buf(&mut buf).await?;
        if read == 0 {
            Ok(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
    .boxed()
}
