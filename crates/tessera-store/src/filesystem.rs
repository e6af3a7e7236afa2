//! Filesystem storage adapter.
//!
//! Chunks live at `<base>/<first-two-hash-chars>/<hash(id)>.json` with the
//! hash algorithm taken from configuration. Writes go to a `.tmp` sibling
//! and are renamed over the target; when locking is enabled a `.lock`
//! sibling holding `{timestamp, pid}` serializes writers, with stale locks
//! forcibly reclaimed. Availability wins over exclusivity: if a lock cannot
//! be acquired the operation proceeds without it and logs a warning.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tessera_core::{Chunk, ChunkFilter, ChunkSummary, StorageAdapter, StoreError};

use crate::codec;

/// Hash used to shard chunk ids into directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl HashAlgorithm {
    /// Hex digest of `data`.
    #[must_use]
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

/// Configuration for the filesystem adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilesystemConfig {
    pub base_path: PathBuf,
    pub use_locks: bool,
    /// Age in milliseconds after which a foreign lock is considered stale.
    #[serde(rename = "lockTimeout")]
    pub lock_timeout_ms: u64,
    /// Applied when a chunk carries no explicit expiry, milliseconds.
    #[serde(rename = "defaultTTL")]
    pub default_ttl_ms: i64,
    pub hash_algorithm: HashAlgorithm,
    pub cleanup_on_start: bool,
    #[serde(rename = "cleanupInterval")]
    pub cleanup_interval_ms: Option<u64>,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(".tessera-cache"),
            use_locks: false,
            lock_timeout_ms: 30_000,
            default_ttl_ms: 86_400_000,
            hash_algorithm: HashAlgorithm::default(),
            cleanup_on_start: false,
            cleanup_interval_ms: None,
        }
    }
}

/// Filesystem adapter over a sharded directory tree.
pub struct FilesystemAdapter {
    config: FilesystemConfig,
    default_ttl: Duration,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl FilesystemAdapter {
    /// Create the adapter, its base directory, and any configured
    /// background cleanup.
    pub async fn connect(config: FilesystemConfig) -> Result<Arc<Self>, StoreError> {
        fs::create_dir_all(&config.base_path).await?;

        let adapter = Arc::new(Self {
            default_ttl: Duration::milliseconds(config.default_ttl_ms),
            config,
            cleanup_task: Mutex::new(None),
        });

        // The startup sweep runs inline so callers observe a clean tree as
        // soon as connect returns.
        if adapter.config.cleanup_on_start {
            if let Err(err) = adapter.cleanup().await {
                warn!(error = %err, "startup cleanup failed");
            }
        }
        crate::spawn_cleanup(
            &adapter,
            false,
            adapter.config.cleanup_interval_ms,
            &adapter.cleanup_task,
        );

        Ok(adapter)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let hash = self.config.hash_algorithm.digest_hex(id.as_bytes());
        self.config
            .base_path
            .join(&hash[..2])
            .join(format!("{hash}.json"))
    }

    /// Try to take the sibling `.lock` file for `path`.
    ///
    /// Returns the lock path on success. A stale lock (older than
    /// `lock_timeout_ms`) is reclaimed; on any other contention or error the
    /// caller proceeds without the lock.
    async fn acquire_lock(&self, path: &Path) -> Option<PathBuf> {
        if !self.config.use_locks {
            return None;
        }
        let lock_path = path_with_suffix(path, "lock");
        match self.try_create_lock(&lock_path).await {
            Ok(()) => Some(lock_path),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.lock_is_stale(&lock_path).await {
                    warn!(lock = %lock_path.display(), "reclaiming stale lock");
                    let _ = fs::remove_file(&lock_path).await;
                    match self.try_create_lock(&lock_path).await {
                        Ok(()) => Some(lock_path),
                        Err(err) => {
                            warn!(lock = %lock_path.display(), error = %err, "proceeding without lock");
                            None
                        }
                    }
                } else {
                    warn!(lock = %lock_path.display(), "lock held, proceeding without it");
                    None
                }
            }
            Err(err) => {
                warn!(lock = %lock_path.display(), error = %err, "proceeding without lock");
                None
            }
        }
    }

    async fn try_create_lock(&self, lock_path: &Path) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
            .await?;
        let payload = json!({
            "timestamp": Utc::now().timestamp_millis(),
            "pid": std::process::id(),
        });
        file.write_all(payload.to_string().as_bytes()).await?;
        Ok(())
    }

    async fn lock_is_stale(&self, lock_path: &Path) -> bool {
        let Ok(meta) = fs::metadata(lock_path).await else {
            return true;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        modified
            .elapsed()
            .map(|age| age.as_millis() as u64 > self.config.lock_timeout_ms)
            .unwrap_or(false)
    }

    async fn release_lock(&self, lock: Option<PathBuf>) {
        if let Some(lock_path) = lock {
            if let Err(err) = fs::remove_file(&lock_path).await {
                warn!(lock = %lock_path.display(), error = %err, "failed to release lock");
            }
        }
    }

    /// Write `contents` to `path` via a `.tmp` sibling and rename, falling
    /// back to copy + unlink when rename fails across filesystems.
    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path_with_suffix(path, "tmp");
        fs::write(&tmp_path, contents).await?;

        if let Err(rename_err) = fs::rename(&tmp_path, path).await {
            debug!(error = %rename_err, "rename failed, falling back to copy");
            fs::copy(&tmp_path, path).await?;
            fs::remove_file(&tmp_path).await?;
        }
        Ok(())
    }

    async fn read_chunk(&self, path: &Path) -> Result<Option<Chunk>, StoreError> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match codec::decode_chunk(&raw) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt chunk file, treating as absent");
                Ok(None)
            }
        }
    }

    /// Visit every chunk file under the base directory.
    async fn chunk_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        let mut shards = match fs::read_dir(&self.config.base_path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    async fn delete_if_empty(&self, shard: &Path) {
        let Ok(mut entries) = fs::read_dir(shard).await else {
            return;
        };
        if matches!(entries.next_entry().await, Ok(None)) {
            let _ = fs::remove_dir(shard).await;
        }
    }
}

#[async_trait]
impl StorageAdapter for FilesystemAdapter {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn save(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let path = self.path_for(&chunk.id);
        let contents = codec::encode_chunk(chunk)?;

        let lock = self.acquire_lock(&path).await;
        let result = self.write_atomic(&path, &contents).await;
        self.release_lock(lock).await;
        result?;

        debug!(chunk_id = %chunk.id, path = %path.display(), "saved chunk");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        let path = self.path_for(id);
        let Some(mut chunk) = self.read_chunk(&path).await? else {
            return Ok(None);
        };

        if chunk.is_expired(Utc::now(), self.default_ttl) {
            debug!(chunk_id = %id, "evicting expired chunk on read");
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        chunk.last_accessed = Utc::now();
        match codec::encode_chunk(&chunk) {
            Ok(contents) => {
                if let Err(err) = self.write_atomic(&path, &contents).await {
                    warn!(chunk_id = %id, error = %err, "failed to persist lastAccessed");
                }
            }
            Err(err) => warn!(chunk_id = %id, error = %err, "failed to persist lastAccessed"),
        }

        Ok(Some(chunk))
    }

    async fn has(&self, id: &str) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.path_for(id)).await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(id);
        let lock = self.acquire_lock(&path).await;
        let result = fs::remove_file(&path).await;
        self.release_lock(lock).await;

        match result {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, filter: Option<ChunkFilter>) -> Result<Vec<ChunkSummary>, StoreError> {
        let filter = filter.unwrap_or_default();
        let mut chunks = Vec::new();
        for path in self.chunk_files().await? {
            if let Some(chunk) = self.read_chunk(&path).await? {
                chunks.push(chunk);
            }
        }
        Ok(filter.apply(chunks.iter(), self.default_ttl))
    }

    async fn cleanup(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut evicted = 0u64;

        for path in self.chunk_files().await? {
            match self.read_chunk(&path).await {
                Ok(Some(chunk)) if chunk.is_expired(now, self.default_ttl) => {
                    match fs::remove_file(&path).await {
                        Ok(()) => evicted += 1,
                        Err(err) => {
                            warn!(path = %path.display(), error = %err, "failed to evict chunk")
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "cleanup skipping file"),
            }
        }

        let mut shards = fs::read_dir(&self.config.base_path).await?;
        while let Some(shard) = shards.next_entry().await? {
            if shard.file_type().await?.is_dir() {
                self.delete_if_empty(&shard.path()).await;
            }
        }

        debug!(evicted, "filesystem cleanup");
        Ok(evicted)
    }

    async fn close(&self) -> Result<(), StoreError> {
        crate::abort_cleanup(&self.cleanup_task);
        Ok(())
    }
}

impl Drop for FilesystemAdapter {
    fn drop(&mut self) {
        crate::abort_cleanup(&self.cleanup_task);
    }
}

/// `dir/file.json` → `dir/file.json.<suffix>`.
fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}
