//! Core traits for tessera components.
//!
//! - [`ChunkStrategy`]: type-specific splitting of a raw document value
//! - [`StorageAdapter`]: uniform persistence contract over heterogeneous
//!   backends
//!
//! These traits enable a pluggable architecture where strategies are
//! dispatched by [`ChunkType`] and storage backends can be swapped without
//! changing the rest of the system.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ChunkError, StoreError};
use crate::types::{Chunk, ChunkContext, ChunkFilter, ChunkResult, ChunkSummary, ChunkType};

// ============================================================================
// Chunking
// ============================================================================

/// Trait for type-specific splitting algorithms.
///
/// Implementations must register every source id they process into the
/// context's id map, emit links only to chunk ids produced within the same
/// call (their own or a sibling's), and bound recursion with an explicit
/// depth cap.
#[async_trait]
pub trait ChunkStrategy: Send + Sync {
    /// The chunk type this strategy produces.
    fn chunk_type(&self) -> ChunkType;

    /// Whether `data` needs to be split at all under `ctx`'s budget.
    fn should_chunk(&self, data: &Value, ctx: &ChunkContext) -> bool;

    /// Split `data` into a primary chunk plus dependents.
    async fn chunk(&self, data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError>;
}

// ============================================================================
// Storage
// ============================================================================

/// Uniform persistence contract implemented by every backend.
///
/// Backends differ only in how they realise atomicity and expiry; the
/// contract is otherwise identical. All operations may fail with a transient
/// or permanent [`StoreError`]; transient failures are retried per the
/// adapter's policy before surfacing.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend name, for registry lookups and logs.
    fn name(&self) -> &str;

    /// Upsert a chunk. Atomic with respect to concurrent readers.
    async fn save(&self, chunk: &Chunk) -> Result<(), StoreError>;

    /// Fetch a chunk by id.
    ///
    /// Returns `None` on miss or after silent expiry eviction. Updates
    /// `last_accessed` as a best-effort side effect; a failure to do so is
    /// logged, never surfaced.
    async fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError>;

    /// Whether a chunk exists, without fetching the payload when possible.
    async fn has(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete a chunk. True iff it existed and is now gone.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// List chunk summaries. `filter` is merged with [`ChunkFilter`]
    /// defaults; the result is sorted and truncated per the filter.
    async fn list(&self, filter: Option<ChunkFilter>) -> Result<Vec<ChunkSummary>, StoreError>;

    /// Delete every expired chunk. Returns the number evicted.
    ///
    /// Per-item failures are swallowed and logged; the sweep continues.
    async fn cleanup(&self) -> Result<u64, StoreError>;

    /// Release connections and stop background work.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
