//! In-memory storage adapter.
//!
//! Keeps every chunk in a map behind an async lock. Useful for unit tests,
//! development builds and as the reference implementation of the adapter
//! contract — expiry and filtering behave exactly as in the persistent
//! backends.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use tessera_core::{Chunk, ChunkFilter, ChunkSummary, StorageAdapter, StoreError};

/// Default TTL for chunks without an explicit expiry: 24 hours.
const DEFAULT_TTL_MS: i64 = 86_400_000;

/// In-memory adapter for tests and development.
pub struct MemoryAdapter {
    default_ttl: Duration,
    chunks: Arc<RwLock<HashMap<String, Chunk>>>,
}

impl MemoryAdapter {
    /// Create an empty adapter with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL_MS)
    }

    /// Create an empty adapter with a custom default TTL in milliseconds.
    #[must_use]
    pub fn with_default_ttl(default_ttl_ms: i64) -> Self {
        Self {
            default_ttl: Duration::milliseconds(default_ttl_ms),
            chunks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored chunks, including not-yet-evicted expired ones.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Whether the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let mut chunks = self.chunks.write().await;
        chunks.insert(chunk.id.clone(), chunk.clone());
        debug!(chunk_id = %chunk.id, "saved chunk");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        let mut chunks = self.chunks.write().await;
        let Some(chunk) = chunks.get_mut(id) else {
            return Ok(None);
        };
        if chunk.is_expired(Utc::now(), self.default_ttl) {
            chunks.remove(id);
            debug!(chunk_id = %id, "evicted expired chunk on read");
            return Ok(None);
        }
        chunk.last_accessed = Utc::now();
        Ok(Some(chunk.clone()))
    }

    async fn has(&self, id: &str) -> Result<bool, StoreError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .get(id)
            .is_some_and(|c| !c.is_expired(Utc::now(), self.default_ttl)))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut chunks = self.chunks.write().await;
        Ok(chunks.remove(id).is_some())
    }

    async fn list(&self, filter: Option<ChunkFilter>) -> Result<Vec<ChunkSummary>, StoreError> {
        let filter = filter.unwrap_or_default();
        let chunks = self.chunks.read().await;
        Ok(filter.apply(chunks.values(), self.default_ttl))
    }

    async fn cleanup(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|_, chunk| !chunk.is_expired(now, self.default_ttl));
        let evicted = (before - chunks.len()) as u64;
        debug!(evicted, "memory cleanup");
        Ok(evicted)
    }
}
