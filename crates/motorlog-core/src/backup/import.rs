//! Snapshot import
//!
//! The inverse of export, with the validation the export path does not
//! need: every blob artifact referenced from the tree must exist in the
//! snapshot directory before anything is written, the target database
//! must be empty, and a document that fails to decode aborts the run
//! rather than being skipped.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument};

use motorlog_store::{ContentType, FileName, StoreHandle};

use super::{
    artifact_path, collection_specs, file_stream, BackupError, TreeNode, ROOT_NODE, SNAPSHOT_FILE,
};

/// What an import wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub documents: usize,
    pub files: usize,
}

/// Restore a snapshot directory into an empty database.
///
/// Fails with [`BackupError::MissingBackupFile`], before any write,
/// if the tree references an artifact that is not in the directory,
/// and with [`BackupError::TargetNotEmpty`] if the database already
/// holds documents in any registered collection.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn import_snapshot(db: &StoreHandle, dir: &Path) -> Result<ImportReport, BackupError> {
    let bytes = tokio::fs::read(dir.join(SNAPSHOT_FILE)).await?;
    let root: TreeNode =
        serde_json::from_slice(&bytes).map_err(|e| BackupError::Malformed(e.to_string()))?;
    if root.name != ROOT_NODE {
        return Err(BackupError::Malformed(format!(
            "expected root node `{ROOT_NODE}`, found `{}`",
            root.name
        )));
    }

    let specs = collection_specs();

    // The target must be empty before anything else happens.
    for spec in &specs {
        let count = (spec.count)(db).await?;
        if count > 0 {
            return Err(BackupError::TargetNotEmpty {
                collection: spec.name,
                count,
            });
        }
    }

    // Every referenced artifact must be present before any write.
    let mut referenced: BTreeMap<String, String> = BTreeMap::new();
    for spec in &specs {
        let Some(file_ref) = spec.file_ref else {
            continue;
        };
        for node in root.children_named(spec.name) {
            if let Some(name) = node.attr(file_ref.name_attr) {
                let content_type = node.attr(file_ref.content_type_attr).unwrap_or_default();
                referenced.insert(name.to_string(), content_type.to_string());
            }
        }
    }
    for name in referenced.keys() {
        let path = artifact_path(dir, name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(BackupError::MissingBackupFile {
                file_name: name.clone(),
            });
        }
    }

    // Documents, collection by collection in declared order.
    let mut documents = 0;
    for spec in &specs {
        for node in root.children_named(spec.name) {
            (spec.import)(db, node).await?;
            documents += 1;
        }
        debug!(collection = spec.name, "Imported collection");
    }

    // Blob content, streamed from the artifacts.
    let blobs = db.blobs();
    for (name, content_type) in &referenced {
        let path = artifact_path(dir, name)?;
        let file = tokio::fs::File::open(&path).await?;
        blobs
            .put(
                &FileName::new(name.clone())?,
                &ContentType::new(content_type.clone())?,
                file_stream(file),
            )
            .await?;
        debug!(artifact = name.as_str(), "Restored blob artifact");
    }

    let report = ImportReport {
        documents,
        files: referenced.len(),
    };
    info!(
        documents = report.documents,
        files = report.files,
        "Snapshot imported"
    );
    Ok(report)
}
