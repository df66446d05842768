//! The [`CacheStore`] collaborator interface and two reference
//! implementations: an in-memory map and a content-addressed file store.
//! Neither implementation is the point of this crate -- a production
//! deployment is expected to bring its own -- but both are exercised by the
//! integration tests and are useful on their own for small programs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::BoxError;
use crate::serialize::{self, CachedEntry};

/// Storage backend for encoded cache entries. Implementations are free to
/// choose any physical layout; the core only requires the atomicity
/// described on [`CacheStore::set`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the raw encoded bytes stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;

    /// Stores `value` at `key`, replacing any prior value atomically: a
    /// concurrent reader never observes a partial write (I3). `expires` is
    /// an advisory hint of the entry's freshness lifetime; implementations
    /// may use it to schedule eviction but must not reject or alter `value`
    /// based on it.
    async fn set(&self, key: &str, value: Vec<u8>, expires: Option<Duration>) -> Result<(), BoxError>;

    /// Removes any value stored at `key`. Idempotent.
    async fn delete(&self, key: &str) -> Result<(), BoxError>;

    /// Releases any resources held by the store.
    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// In-memory reference [`CacheStore`], grounded on `cachecontrol`'s
/// dict-backed cache: a single lock-protected map, useful for tests and
/// short-lived processes. The freshness hint passed to `set` is ignored --
/// entries live until explicitly deleted or the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _expires: Option<Duration>) -> Result<(), BoxError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// On-disk metadata file written alongside a content-addressed body, mirroring
/// the split `managers/streaming_cache.rs` uses between a small metadata
/// record and the (potentially large) body blob it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileMetadata {
    entry: CachedEntry,
    content_digest: String,
}

/// File-based reference [`CacheStore`]. Each key maps to a metadata file
/// (named by a hash of the key) plus a content-addressed body file (named by
/// a hash of the body bytes); both are written via write-to-temp-then-rename
/// so readers never observe a partial write. The freshness hint passed to
/// `set` is ignored -- this reference implementation performs no eviction.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta", digest_hex(key.as_bytes())))
    }

    fn content_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.body"))
    }

    async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    async fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
}

/// A small non-cryptographic digest (FNV-1a) used to turn an arbitrary-length
/// key or body into a safe filename; collisions would only cause a spurious
/// cache miss or an orphaned body file, never corruption, since the stored
/// entry always carries its own vary/key-matching metadata.
fn digest_hex(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let meta_bytes = match tokio::fs::read(self.metadata_path(key)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Box::new(e)),
        };
        let meta: FileMetadata = rmp_serde::from_slice(&meta_bytes).map_err(|e| Box::new(e) as BoxError)?;
        let body = match tokio::fs::read(self.content_path(&meta.content_digest)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Box::new(e)),
        };
        let mut entry = meta.entry;
        entry.body = body;
        Ok(Some(serialize::encode(&entry).map_err(|e| Box::new(e) as BoxError)?))
    }

    async fn set(&self, key: &str, value: Vec<u8>, _expires: Option<Duration>) -> Result<(), BoxError> {
        self.ensure_root().await?;
        let mut entry = serialize::decode_entry_unchecked(&value).ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cannot split an unrecognized entry blob into metadata and body",
            )) as BoxError
        })?;
        let body = std::mem::take(&mut entry.body);
        let content_digest = digest_hex(&body);

        Self::write_atomic(&self.content_path(&content_digest), &body).await?;
        let meta = FileMetadata { entry, content_digest };
        let meta_bytes = rmp_serde::to_vec(&meta).map_err(|e| Box::new(e) as BoxError)?;
        Self::write_atomic(&self.metadata_path(key), &meta_bytes).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        let meta_path = self.metadata_path(key);
        let meta_bytes = match tokio::fs::read(&meta_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Box::new(e)),
        };
        // Best-effort: remove the metadata file even if it no longer parses,
        // the content file is orphaned rather than leaked either way.
        if let Ok(meta) = rmp_serde::from_slice::<FileMetadata>(&meta_bytes) {
            match tokio::fs::remove_file(self.content_path(&meta.content_digest)).await {
                Ok(()) | Err(_) => {}
            }
        }
        match tokio::fs::remove_file(&meta_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Box::new(e)),
        }
    }
}
