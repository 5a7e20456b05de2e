//! Durable storage for a [`VectorIndex`] as two paired artifacts.
//!
//! - `<base>.vectors`: a fixed header, every vector as little-endian f16 in
//!   entry order, and a blake3 digest of everything before it.
//! - `<base>.meta.db`: a SQLite database holding each entry's passage text and
//!   offsets in the same order, plus the digest of the vectors file it pairs with.
//!
//! Both are written to temporary files and renamed into place. At load time a
//! lone artifact, a checksum failure, or any disagreement between the two
//! (digest, count, dimension) is reported as [`IndexError::CorruptStore`].
//!
//! ## Metadata schema
//!
//! ```sql
//! CREATE TABLE entries (
//!     ordinal INTEGER PRIMARY KEY,     -- position in the vectors file
//!     chunk_id TEXT NOT NULL,
//!     source TEXT NOT NULL,
//!     content_hash BLOB NOT NULL,      -- blake3 of the document (32 bytes)
//!     sequence INTEGER NOT NULL,
//!     char_start INTEGER NOT NULL,
//!     char_end INTEGER NOT NULL,
//!     overlap INTEGER NOT NULL,
//!     text TEXT NOT NULL,
//!     ingested_at TIMESTAMP NOT NULL
//! );
//! CREATE TABLE store_info (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```

use crate::entry::IndexEntry;
use crate::error::{IndexError, Result};
use crate::index::{Metric, Snapshot, VectorIndex};
use chrono::{DateTime, Utc};
use docent_embed::EmbeddingModelMetadata;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const MAGIC: &[u8; 8] = b"DCNTVEC1";
const FORMAT_VERSION: u32 = 1;
/// magic, version, metric, padding, dimension, count
const HEADER_LEN: usize = 8 + 4 + 1 + 3 + 4 + 8;
const DIGEST_LEN: usize = 32;

/// Locations of the two artifacts for one base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

impl StorePaths {
    pub fn new(base: &Path) -> Self {
        Self {
            vectors: with_suffix(base, ".vectors"),
            metadata: with_suffix(base, ".meta.db"),
        }
    }

    fn temporary(&self) -> Self {
        Self {
            vectors: with_suffix(&self.vectors, ".tmp"),
            metadata: with_suffix(&self.metadata, ".tmp"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

struct DecodedVectors {
    metric: Metric,
    dimension: usize,
    vectors: Vec<Vec<f16>>,
    digest: String,
}

fn encode_vectors(metric: Metric, dimension: usize, entries: &[Arc<IndexEntry>]) -> Vec<u8> {
    let mut bytes =
        Vec::with_capacity(HEADER_LEN + entries.len() * dimension * 2 + DIGEST_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(metric.to_byte());
    bytes.extend_from_slice(&[0u8; 3]);
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        for value in &entry.vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    let digest = blake3::hash(&bytes);
    bytes.extend_from_slice(digest.as_bytes());
    bytes
}

fn decode_vectors(path: &Path, bytes: &[u8]) -> Result<DecodedVectors> {
    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(IndexError::corrupt(path, "index artifact is truncated"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let digest = blake3::hash(body);
    if digest.as_bytes() != trailer {
        return Err(IndexError::corrupt(path, "index artifact checksum mismatch"));
    }
    if &body[..8] != MAGIC {
        return Err(IndexError::corrupt(path, "not a vector index artifact"));
    }

    let version = u32::from_le_bytes(read_array(&body[8..12]));
    if version != FORMAT_VERSION {
        return Err(IndexError::corrupt(
            path,
            format!("unsupported format version {version}"),
        ));
    }
    let metric = Metric::from_byte(body[12])
        .ok_or_else(|| IndexError::corrupt(path, format!("unknown metric {}", body[12])))?;
    let dimension = u32::from_le_bytes(read_array(&body[16..20])) as usize;
    let count = u64::from_le_bytes(read_array(&body[20..28])) as usize;

    let data = &body[HEADER_LEN..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(2))
        .ok_or_else(|| IndexError::corrupt(path, "header sizes overflow"))?;
    if data.len() != expected {
        return Err(IndexError::corrupt(
            path,
            format!(
                "expected {expected} bytes of vector data for {count}x{dimension}, found {}",
                data.len()
            ),
        ));
    }

    let vectors = if dimension == 0 {
        vec![Vec::new(); count]
    } else {
        data.chunks_exact(dimension * 2)
            .map(|row| {
                row.chunks_exact(2)
                    .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
                    .collect()
            })
            .collect()
    };

    Ok(DecodedVectors {
        metric,
        dimension,
        vectors,
        digest: digest.to_hex().to_string(),
    })
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(bytes);
    array
}

async fn connect(path: &Path, create: bool) -> std::result::Result<SqlitePool, sqlx::Error> {
    SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(path)
            // Single-file database, so the artifact can be renamed as one unit.
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(create)
            .read_only(!create),
    )
    .await
}

async fn create_tables(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            ordinal INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            source TEXT NOT NULL,
            content_hash BLOB NOT NULL,
            sequence INTEGER NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            overlap INTEGER NOT NULL,
            text TEXT NOT NULL,
            ingested_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn write_metadata(
    path: &Path,
    snapshot: &Snapshot,
    metric: Metric,
    digest: &str,
) -> Result<()> {
    let embedder = serde_json::to_string(&snapshot.model)
        .map_err(|e| IndexError::io(path, std::io::Error::other(e)))?;
    let info = [
        ("format_version", FORMAT_VERSION.to_string()),
        ("vectors_digest", digest.to_string()),
        ("entry_count", snapshot.entries.len().to_string()),
        ("dimension", snapshot.dimension().to_string()),
        ("metric", metric.to_string()),
        ("embedder", embedder),
        ("saved_at", Utc::now().to_rfc3339()),
    ];

    let pool = connect(path, true).await?;
    create_tables(&pool).await?;
    let mut tx = pool.begin().await?;
    for (ordinal, entry) in snapshot.entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO entries (ordinal, chunk_id, source, content_hash, sequence,
                                 char_start, char_end, overlap, text, ingested_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(ordinal as i64)
        .bind(&entry.chunk_id)
        .bind(&entry.source)
        .bind(&entry.content_hash[..])
        .bind(entry.sequence as i64)
        .bind(entry.start as i64)
        .bind(entry.end as i64)
        .bind(entry.overlap as i64)
        .bind(&entry.text)
        .bind(entry.ingested_at)
        .execute(&mut *tx)
        .await?;
    }
    for (key, value) in info {
        sqlx::query("INSERT INTO store_info (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    pool.close().await;
    Ok(())
}

struct StoredRow {
    chunk_id: String,
    source: String,
    content_hash: [u8; 32],
    sequence: usize,
    start: usize,
    end: usize,
    overlap: usize,
    text: String,
    ingested_at: DateTime<Utc>,
}

async fn read_metadata(
    path: &Path,
) -> std::result::Result<(HashMap<String, String>, Vec<StoredRow>), String> {
    let pool = connect(path, false).await.map_err(|e| e.to_string())?;
    let result = async {
        let info: HashMap<String, String> = sqlx::query("SELECT key, value FROM store_info")
            .fetch_all(&pool)
            .await
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|row| Ok((row.try_get("key")?, row.try_get("value")?)))
            .collect::<std::result::Result<_, sqlx::Error>>()
            .map_err(|e| e.to_string())?;

        let rows = sqlx::query(
            r#"
            SELECT ordinal, chunk_id, source, content_hash, sequence, char_start, char_end,
                   overlap, text, ingested_at
            FROM entries ORDER BY ordinal
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| e.to_string())?;

        let mut stored = Vec::with_capacity(rows.len());
        for (position, row) in rows.into_iter().enumerate() {
            stored.push(decode_row(position, &row)?);
        }
        Ok::<_, String>((info, stored))
    }
    .await;
    pool.close().await;
    result
}

fn decode_row(
    position: usize,
    row: &sqlx::sqlite::SqliteRow,
) -> std::result::Result<StoredRow, String> {
    let get_usize = |column: &str| -> std::result::Result<usize, String> {
        let value: i64 = row.try_get(column).map_err(|e| e.to_string())?;
        usize::try_from(value).map_err(|_| format!("negative {column} in row {position}"))
    };

    if get_usize("ordinal")? != position {
        return Err(format!("entry ordinals are not contiguous at {position}"));
    }
    let hash: Vec<u8> = row.try_get("content_hash").map_err(|e| e.to_string())?;
    let content_hash: [u8; 32] = hash
        .try_into()
        .map_err(|_| format!("content hash of row {position} is not 32 bytes"))?;

    Ok(StoredRow {
        chunk_id: row.try_get("chunk_id").map_err(|e| e.to_string())?,
        source: row.try_get("source").map_err(|e| e.to_string())?,
        content_hash,
        sequence: get_usize("sequence")?,
        start: get_usize("char_start")?,
        end: get_usize("char_end")?,
        overlap: get_usize("overlap")?,
        text: row.try_get("text").map_err(|e| e.to_string())?,
        ingested_at: row.try_get("ingested_at").map_err(|e| e.to_string())?,
    })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| IndexError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| IndexError::io(path, e))?;
    file.sync_all().await.map_err(|e| IndexError::io(path, e))?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IndexError::io(path, e)),
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| IndexError::io(path, e))
}

impl VectorIndex {
    /// Persist the current snapshot next to `base`.
    ///
    /// Writers wait while a save is in progress; readers do not.
    pub async fn save(&self, base: &Path) -> Result<()> {
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot().await;
        let paths = StorePaths::new(base);
        let temporary = paths.temporary();

        if let Some(parent) = paths.vectors.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }

        let bytes = encode_vectors(self.metric(), snapshot.dimension(), &snapshot.entries);
        let digest = hex::encode(&bytes[bytes.len() - DIGEST_LEN..]);
        write_file(&temporary.vectors, &bytes).await?;

        remove_if_exists(&temporary.metadata).await?;
        write_metadata(&temporary.metadata, &snapshot, self.metric(), &digest).await?;

        tokio::fs::rename(&temporary.vectors, &paths.vectors)
            .await
            .map_err(|e| IndexError::io(&paths.vectors, e))?;
        tokio::fs::rename(&temporary.metadata, &paths.metadata)
            .await
            .map_err(|e| IndexError::io(&paths.metadata, e))?;

        tracing::info!(
            "Saved {} entries to {}",
            snapshot.entries.len(),
            paths.vectors.display()
        );
        Ok(())
    }

    /// Load whatever index is stored at `base`, whichever embedder produced it.
    /// Returns `None` when neither artifact exists.
    pub async fn load(base: &Path, metric: Metric) -> Result<Option<VectorIndex>> {
        let paths = StorePaths::new(base);
        match (exists(&paths.vectors).await?, exists(&paths.metadata).await?) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(IndexError::corrupt(
                    &paths.metadata,
                    "metadata artifact is missing",
                ));
            }
            (false, true) => {
                return Err(IndexError::corrupt(
                    &paths.vectors,
                    "index artifact is missing",
                ));
            }
            (true, true) => {}
        }

        let bytes = tokio::fs::read(&paths.vectors)
            .await
            .map_err(|e| IndexError::io(&paths.vectors, e))?;
        let decoded = decode_vectors(&paths.vectors, &bytes)?;
        let (info, rows) = read_metadata(&paths.metadata)
            .await
            .map_err(|reason| IndexError::corrupt(&paths.metadata, reason))?;

        let corrupt = |reason: String| IndexError::corrupt(&paths.metadata, reason);
        let field = |key: &str| {
            info.get(key)
                .ok_or_else(|| corrupt(format!("store_info is missing {key}")))
        };

        if field("format_version")? != &FORMAT_VERSION.to_string() {
            return Err(corrupt("unsupported metadata format version".to_string()));
        }
        if field("vectors_digest")? != &decoded.digest {
            return Err(corrupt(
                "metadata was written for a different index artifact".to_string(),
            ));
        }
        if field("entry_count")? != &decoded.vectors.len().to_string()
            || rows.len() != decoded.vectors.len()
        {
            return Err(corrupt(format!(
                "entry count disagrees: {} vectors, {} metadata rows",
                decoded.vectors.len(),
                rows.len()
            )));
        }
        if field("dimension")? != &decoded.dimension.to_string() {
            return Err(corrupt("dimension disagrees with index artifact".to_string()));
        }
        let model: EmbeddingModelMetadata = serde_json::from_str(field("embedder")?)
            .map_err(|e| corrupt(format!("unreadable embedder metadata: {e}")))?;
        if model.dimension != decoded.dimension {
            return Err(corrupt(
                "embedder dimension disagrees with index artifact".to_string(),
            ));
        }

        if decoded.metric != metric {
            tracing::warn!(
                "Index at {} was saved with {} similarity; using configured {}",
                paths.vectors.display(),
                decoded.metric,
                metric
            );
        }

        let entries: Vec<IndexEntry> = rows
            .into_iter()
            .zip(decoded.vectors)
            .map(|(row, vector)| IndexEntry {
                chunk_id: row.chunk_id,
                source: row.source,
                content_hash: row.content_hash,
                sequence: row.sequence,
                start: row.start,
                end: row.end,
                overlap: row.overlap,
                text: row.text,
                ingested_at: row.ingested_at,
                vector,
            })
            .collect();

        tracing::info!(
            "Loaded {} entries from {} ({})",
            entries.len(),
            paths.vectors.display(),
            model.model_id()
        );
        Ok(Some(VectorIndex::from_entries(model, metric, entries)))
    }

    /// Load the index stored at `base` for use with `model`, or start an empty
    /// one when nothing is stored.
    ///
    /// # Errors
    /// [`IndexError::EmbedderMismatch`] when non-empty stored vectors come from a
    /// different model; [`IndexError::CorruptStore`] as for [`VectorIndex::load`].
    pub async fn open(
        base: &Path,
        model: &EmbeddingModelMetadata,
        metric: Metric,
    ) -> Result<VectorIndex> {
        let Some(index) = Self::load(base, metric).await? else {
            tracing::info!(
                "No stored index at {}, starting empty",
                StorePaths::new(base).vectors.display()
            );
            return Ok(VectorIndex::new(model.clone(), metric));
        };

        let stored = index.model().await;
        if stored.is_compatible_with(model) {
            return Ok(index);
        }
        if index.is_empty().await {
            return Ok(VectorIndex::new(model.clone(), metric));
        }
        Err(IndexError::EmbedderMismatch {
            stored: stored.model_id(),
            configured: model.model_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_context::Document;
    use tempfile::tempdir;

    fn model(dimension: usize) -> EmbeddingModelMetadata {
        EmbeddingModelMetadata::new("test-model", "test", dimension).with_normalized(true)
    }

    fn entries(source: &str, text: &str) -> Vec<IndexEntry> {
        let document = Document::new(source, text);
        docent_context::split(text, 20, 5)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let vector = vec![
                    f16::from_f32(i as f32 * 0.25),
                    f16::from_f32(1.0),
                    f16::from_f32(-0.5),
                ];
                IndexEntry::from_chunk(&document, chunk, vector)
            })
            .collect()
    }

    async fn sample_index() -> VectorIndex {
        let index = VectorIndex::new(model(3), Metric::Cosine);
        index
            .insert(entries("sky.txt", "The sky is blue. Water is wet."))
            .await
            .unwrap();
        index
            .insert(entries("grass.md", "Grass is green in spring and brown in summer."))
            .await
            .unwrap();
        index
    }

    #[test]
    fn test_store_paths() {
        let paths = StorePaths::new(Path::new("data/index"));
        assert_eq!(paths.vectors, PathBuf::from("data/index.vectors"));
        assert_eq!(paths.metadata, PathBuf::from("data/index.meta.db"));
        assert_eq!(
            paths.temporary().metadata,
            PathBuf::from("data/index.meta.db.tmp")
        );
    }

    #[test]
    fn test_vector_artifact_detects_tampering() {
        let entry = Arc::new(entries("a", "abc").remove(0));
        let mut bytes = encode_vectors(Metric::InnerProduct, 3, &[entry]);
        let decoded = decode_vectors(Path::new("x"), &bytes).unwrap();
        assert_eq!(decoded.metric, Metric::InnerProduct);
        assert_eq!(decoded.vectors.len(), 1);
        assert_eq!(decoded.vectors[0][1], f16::from_f32(1.0));

        bytes[HEADER_LEN] ^= 0xff;
        assert!(matches!(
            decode_vectors(Path::new("x"), &bytes),
            Err(IndexError::CorruptStore { .. })
        ));
        assert!(matches!(
            decode_vectors(Path::new("x"), &bytes[..10]),
            Err(IndexError::CorruptStore { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("store").join("index");
        let index = sample_index().await;
        index.save(&base).await?;

        let loaded = VectorIndex::open(&base, &model(3), Metric::Cosine).await?;
        assert_eq!(loaded.len().await, index.len().await);
        assert_eq!(loaded.stats().await, index.stats().await);

        let query = [f16::from_f32(0.5), f16::from_f32(1.0), f16::from_f32(0.0)];
        let before = index.search(&query, 4).await?;
        let after = loaded.search(&query, 4).await?;
        let ids = |hits: &[crate::entry::ScoredChunk]| {
            hits.iter()
                .map(|h| (h.chunk_id().to_string(), h.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&before), ids(&after));

        let original = index.snapshot().await;
        let restored = loaded.snapshot().await;
        for (a, b) in original.entries.iter().zip(&restored.entries) {
            assert_eq!(a.as_ref(), b.as_ref());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_store_starts_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("index");
        assert!(VectorIndex::load(&base, Metric::Cosine).await?.is_none());

        let index = VectorIndex::open(&base, &model(3), Metric::Cosine).await?;
        assert!(index.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_lone_artifact_is_corrupt() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("index");
        sample_index().await.save(&base).await?;
        std::fs::remove_file(StorePaths::new(&base).metadata)?;

        assert!(matches!(
            VectorIndex::load(&base, Metric::Cosine).await,
            Err(IndexError::CorruptStore { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_mismatched_pair_is_corrupt() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        sample_index().await.save(&first).await?;

        let other = VectorIndex::new(model(3), Metric::Cosine);
        other.insert(entries("only.txt", "A single document.")).await?;
        other.save(&second).await?;

        // Pair the first vectors with the second metadata.
        std::fs::copy(
            StorePaths::new(&second).metadata,
            StorePaths::new(&first).metadata,
        )?;
        assert!(matches!(
            VectorIndex::load(&first, Metric::Cosine).await,
            Err(IndexError::CorruptStore { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_garbage_metadata_is_corrupt() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("index");
        sample_index().await.save(&base).await?;
        std::fs::write(StorePaths::new(&base).metadata, b"definitely not sqlite")?;

        assert!(matches!(
            VectorIndex::load(&base, Metric::Cosine).await,
            Err(IndexError::CorruptStore { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_embedder_mismatch_is_reported() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("index");
        sample_index().await.save(&base).await?;

        let other = EmbeddingModelMetadata::new("other-model", "test", 3).with_normalized(true);
        let result = VectorIndex::open(&base, &other, Metric::Cosine).await;
        assert!(matches!(result, Err(IndexError::EmbedderMismatch { .. })));

        // The stored index is still loadable as-is, e.g. to re-embed it.
        let stored = VectorIndex::load(&base, Metric::Cosine).await?.unwrap();
        assert_eq!(stored.model().await, model(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_generation() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("index");
        let index = sample_index().await;
        index.save(&base).await?;

        index.remove_source("sky.txt").await;
        index.save(&base).await?;

        let loaded = VectorIndex::open(&base, &model(3), Metric::Cosine).await?;
        assert_eq!(loaded.stats().await.documents, 1);
        assert!(!StorePaths::new(&base).temporary().vectors.exists());
        Ok(())
    }
}
