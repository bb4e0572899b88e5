//! Streaming blob storage
//!
//! Binary content (photo files) is stored as fixed-size chunk documents
//! plus one metadata document per file name. The metadata write is the
//! commit point: chunks are staged under a fresh upload id and only
//! become resolvable once the metadata document points at them, so an
//! interrupted `put` never leaves a partially-written file visible to
//! `get`.
//!
//! Content moves through [`ByteStream`]s: finite, single-pass,
//! pull-based byte sequences. The producer only advances when the
//! consumer polls, so photo-sized payloads are never buffered whole.
//! A stream is consumed once; callers needing another pass re-request
//! the file from the store and get an independent stream.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Chunk payload size. Hex-encoded at rest, so stored chunk documents
/// are about twice this size.
pub const CHUNK_SIZE: usize = 256 * 1024;

const FILES: &str = "files";
const CHUNKS: &str = "file_chunks";

/// A finite, single-pass sequence of byte chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Build a [`ByteStream`] over in-memory bytes. Mostly useful for small
/// payloads and tests; large content should stream from its source.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let bytes = data.into();
    stream::once(async move { Ok(bytes) }).boxed()
}

/// File name chosen by the caller at `put` time. Opaque, non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::EmptyField { field: "file name" });
        }
        Ok(FileName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MIME content type. At rest it is a plain string; the brand only
/// exists in the type system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(StoreError::EmptyField {
                field: "content type",
            });
        }
        Ok(ContentType(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 digest of a stored file's content, hex-encoded. Computed
/// while the upload streams through `put`; restore verifies artifacts
/// against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentDigest(hex::encode(Sha256::digest(data)))
    }

    fn from_hasher(hasher: Sha256) -> Self {
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata document for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFileMeta {
    pub file_name: FileName,
    pub content_type: ContentType,
    /// Content length in bytes.
    pub length: u64,
    /// Number of chunk documents backing the content.
    pub chunk_count: u32,
    pub digest: ContentDigest,
    pub created_at: DateTime<Utc>,
    /// Staging id the chunk documents are keyed by.
    upload_id: String,
}

/// A stored file: metadata plus a single-use content stream.
pub struct StoredFile {
    pub meta: StoredFileMeta,
    pub content: ByteStream,
}

impl std::fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFile")
            .field("meta", &self.meta)
            .field("content", &"<ByteStream>")
            .finish()
    }
}

#[derive(Serialize)]
struct ChunkDoc {
    upload_id: String,
    seq: u32,
    data: String,
}

#[derive(Deserialize)]
struct ChunkRow {
    data: String,
}

/// Streaming store for binary file content.
#[derive(Clone)]
pub struct BlobStore {
    db: Surreal<Any>,
}

impl BlobStore {
    pub(crate) fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Stream content into the store under a caller-chosen file name.
    ///
    /// The input is re-chunked to [`CHUNK_SIZE`] and written as it
    /// arrives; nothing is buffered beyond one chunk. If the source
    /// stream fails mid-way, staged chunks are removed and no file
    /// becomes visible. Putting an existing name atomically replaces
    /// its content.
    #[instrument(skip_all, fields(file_name = %file_name))]
    pub async fn put(
        &self,
        file_name: &FileName,
        content_type: &ContentType,
        mut content: ByteStream,
    ) -> Result<StoredFileMeta, StoreError> {
        let upload_id = Uuid::new_v4().to_string();
        let mut hasher = Sha256::new();
        let mut buffer = BytesMut::new();
        let mut length: u64 = 0;
        let mut seq: u32 = 0;

        debug!("Staging upload {upload_id}");
        let staged: Result<(), StoreError> = async {
            while let Some(chunk) = content.try_next().await? {
                hasher.update(&chunk);
                length += chunk.len() as u64;
                buffer.extend_from_slice(&chunk);
                while buffer.len() >= CHUNK_SIZE {
                    let data = buffer.split_to(CHUNK_SIZE).freeze();
                    self.write_chunk(&upload_id, seq, &data).await?;
                    seq += 1;
                }
            }
            if !buffer.is_empty() {
                let data = buffer.split().freeze();
                self.write_chunk(&upload_id, seq, &data).await?;
                seq += 1;
            }
            Ok(())
        }
        .await;

        if let Err(err) = staged {
            self.discard_chunks(&upload_id).await;
            return Err(err);
        }

        let meta = StoredFileMeta {
            file_name: file_name.clone(),
            content_type: content_type.clone(),
            length,
            chunk_count: seq,
            digest: ContentDigest::from_hasher(hasher),
            created_at: Utc::now(),
            upload_id: upload_id.clone(),
        };

        if let Err(err) = self.publish(&meta).await {
            self.discard_chunks(&upload_id).await;
            return Err(err);
        }

        info!(
            length = meta.length,
            chunks = meta.chunk_count,
            "Stored file content"
        );
        Ok(meta)
    }

    /// Fetch a file's metadata and a fresh single-use content stream.
    ///
    /// Requesting the same name twice yields two independent streams over
    /// the same stored bytes. Each chunk is fetched on demand as the
    /// consumer polls; dropping the stream mid-way holds no open cursor.
    #[instrument(skip_all, fields(file_name = %file_name))]
    pub async fn get(&self, file_name: &FileName) -> Result<StoredFile, StoreError> {
        let meta = self
            .meta(file_name)
            .await?
            .ok_or_else(|| StoreError::FileNotFound {
                file_name: file_name.as_str().to_string(),
            })?;

        let db = self.db.clone();
        let upload_id = meta.upload_id.clone();
        let chunk_count = meta.chunk_count;
        let name = file_name.as_str().to_string();

        let content = stream::try_unfold(0u32, move |seq| {
            let db = db.clone();
            let upload_id = upload_id.clone();
            let name = name.clone();
            async move {
                if seq >= chunk_count {
                    return Ok(None);
                }
                let mut response = db
                    .query("SELECT data FROM type::table($tb) WHERE upload_id = $upload AND seq = $seq")
                    .bind(("tb", CHUNKS))
                    .bind(("upload", upload_id.clone()))
                    .bind(("seq", seq))
                    .await?;
                let rows: Vec<ChunkRow> = response.take(0)?;
                let row = rows.into_iter().next().ok_or_else(|| {
                    StoreError::Storage(format!("file `{name}` is missing chunk {seq}"))
                })?;
                let data = hex::decode(&row.data).map_err(|_| {
                    StoreError::Storage(format!("file `{name}` chunk {seq} is corrupt"))
                })?;
                Ok(Some((Bytes::from(data), seq + 1)))
            }
        })
        // Polling past the end keeps yielding None instead of replaying.
        .fuse()
        .boxed();

        Ok(StoredFile { meta, content })
    }

    /// Metadata for one file name, if stored.
    pub async fn meta(&self, file_name: &FileName) -> Result<Option<StoredFileMeta>, StoreError> {
        let mut response = self
            .db
            .query("SELECT * OMIT id FROM type::table($tb) WHERE file_name = $name")
            .bind(("tb", FILES))
            .bind(("name", file_name.as_str().to_string()))
            .await?;
        let rows: Vec<StoredFileMeta> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// All stored file metadata, ordered by file name.
    pub async fn list(&self) -> Result<Vec<StoredFileMeta>, StoreError> {
        let mut response = self
            .db
            .query("SELECT * OMIT id FROM type::table($tb) ORDER BY file_name ASC")
            .bind(("tb", FILES))
            .await?;
        let rows: Vec<StoredFileMeta> = response.take(0)?;
        Ok(rows)
    }

    /// Remove a file and its content. Removing an absent name is a
    /// no-op success.
    #[instrument(skip_all, fields(file_name = %file_name))]
    pub async fn delete(&self, file_name: &FileName) -> Result<(), StoreError> {
        let Some(meta) = self.meta(file_name).await? else {
            return Ok(());
        };

        // Metadata first: the file stops resolving before its chunks go.
        let response = self
            .db
            .query("DELETE FROM type::table($tb) WHERE file_name = $name")
            .bind(("tb", FILES))
            .bind(("name", file_name.as_str().to_string()))
            .await?;
        response.check()?;

        self.delete_chunks(&meta.upload_id).await?;
        info!("Deleted file content");
        Ok(())
    }

    async fn write_chunk(&self, upload_id: &str, seq: u32, data: &Bytes) -> Result<(), StoreError> {
        let doc = ChunkDoc {
            upload_id: upload_id.to_string(),
            seq,
            data: hex::encode(data),
        };
        let mut response = self
            .db
            .query("CREATE type::thing($tb, $id) CONTENT $doc")
            .bind(("tb", CHUNKS))
            .bind(("id", format!("{upload_id}-{seq}")))
            .bind(("doc", serde_json::to_value(doc)?))
            .await?;
        let created: Vec<Value> = response.take(0)?;
        if created.is_empty() {
            return Err(StoreError::Storage(format!(
                "chunk {seq} of upload {upload_id} was not written"
            )));
        }
        Ok(())
    }

    /// Point the file name at the staged chunks. Creates the metadata
    /// document, or repoints an existing one and then removes the
    /// superseded chunks.
    async fn publish(&self, meta: &StoredFileMeta) -> Result<(), StoreError> {
        let previous = self.meta(&meta.file_name).await?;

        match previous {
            Some(old) => {
                let response = self
                    .db
                    .query("UPDATE type::table($tb) MERGE $meta WHERE file_name = $name")
                    .bind(("tb", FILES))
                    .bind(("meta", serde_json::to_value(meta)?))
                    .bind(("name", meta.file_name.as_str().to_string()))
                    .await?;
                response.check()?;
                self.delete_chunks(&old.upload_id).await?;
            }
            None => {
                let mut response = self
                    .db
                    .query("CREATE type::table($tb) CONTENT $meta")
                    .bind(("tb", FILES))
                    .bind(("meta", serde_json::to_value(meta)?))
                    .await?;
                let created: Vec<Value> = response.take(0)?;
                if created.is_empty() {
                    return Err(StoreError::Storage(format!(
                        "metadata for `{}` was not written",
                        meta.file_name
                    )));
                }
            }
        }
        Ok(())
    }

    async fn delete_chunks(&self, upload_id: &str) -> Result<(), StoreError> {
        let response = self
            .db
            .query("DELETE FROM type::table($tb) WHERE upload_id = $upload")
            .bind(("tb", CHUNKS))
            .bind(("upload", upload_id.to_string()))
            .await?;
        response.check()?;
        Ok(())
    }

    /// Best-effort cleanup of a failed upload. The chunks are unreachable
    /// either way; leftovers only cost space.
    async fn discard_chunks(&self, upload_id: &str) {
        if let Err(err) = self.delete_chunks(upload_id).await {
            warn!("Could not discard staged chunks for {upload_id}: {err}");
        }
    }
}
