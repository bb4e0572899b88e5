//! Snapshot export
//!
//! Reads every registered collection from a live database, renders the
//! documents into the snapshot tree, and streams every referenced blob
//! to a sibling artifact file. Export trusts the database it reads from;
//! completeness is validated on import.

use std::collections::BTreeMap;
use std::path::Path;

use futures::stream::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use motorlog_store::{FileName, StoreHandle};

use super::{artifact_path, collection_specs, BackupError, TreeNode, ROOT_NODE, SNAPSHOT_FILE};

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub documents: usize,
    pub files: usize,
}

/// Export a point-in-time snapshot of the whole database into `dir`.
///
/// The directory is created if needed. Existing artifacts with the same
/// names are overwritten; the snapshot tree is written last.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub async fn export_snapshot(db: &StoreHandle, dir: &Path) -> Result<ExportReport, BackupError> {
    tokio::fs::create_dir_all(dir).await?;

    let mut root = TreeNode::new(ROOT_NODE).with_attr("format", "1");
    let mut referenced: BTreeMap<String, String> = BTreeMap::new();
    let mut documents = 0;

    for spec in collection_specs() {
        let nodes = (spec.export)(db).await?;
        debug!(collection = spec.name, count = nodes.len(), "Exported collection");
        documents += nodes.len();

        if let Some(file_ref) = spec.file_ref {
            for node in &nodes {
                if let Some(name) = node.attr(file_ref.name_attr) {
                    let content_type = node.attr(file_ref.content_type_attr).unwrap_or_default();
                    referenced.insert(name.to_string(), content_type.to_string());
                }
            }
        }

        root.children.extend(nodes);
    }

    let blobs = db.blobs();
    for name in referenced.keys() {
        let path = artifact_path(dir, name)?;
        let file = blobs.get(&FileName::new(name.clone())?).await?;

        let mut out = tokio::fs::File::create(&path).await?;
        let mut content = file.content;
        while let Some(chunk) = content.try_next().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        debug!(artifact = name.as_str(), "Wrote blob artifact");
    }

    let bytes = serde_json::to_vec_pretty(&root)
        .map_err(|e| BackupError::Malformed(e.to_string()))?;
    tokio::fs::write(dir.join(SNAPSHOT_FILE), bytes).await?;

    let report = ExportReport {
        documents,
        files: referenced.len(),
    };
    info!(
        documents = report.documents,
        files = report.files,
        "Snapshot exported"
    );
    Ok(report)
}
