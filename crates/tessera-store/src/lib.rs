//! Storage layer for tessera.
//!
//! This crate provides the storage backends implementing the
//! [`StorageAdapter`](tessera_core::StorageAdapter) trait, plus the wire
//! codec and the adapter registry.
//!
//! ## Cargo Features
//!
//! - `redis` (default): enables the Redis key-value adapter
//! - `mongodb` (default): enables the MongoDB document adapter
//! - Without them only the memory and filesystem adapters are built
//!
//! ## Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryAdapter`] | In-memory maps, for tests and development |
//! | [`FilesystemAdapter`] | Hashed shard directories, atomic writes, lock files |
//! | [`RedisAdapter`] | Key-value payloads with sorted-set indices and TTL (requires `redis`) |
//! | [`MongoAdapter`] | Upserts into a TTL-indexed collection (requires `mongodb`) |
//!
//! All backends share the persisted JSON wire format of [`codec`], in which
//! timestamps round-trip through a `{"__date":true,"value":"..."}` sentinel
//! wrapper at millisecond fidelity.

pub mod codec;
pub mod filesystem;
pub mod manager;
pub mod memory;
pub mod retry;

#[cfg(feature = "mongodb")]
pub mod document;
#[cfg(feature = "redis")]
pub mod kv;

pub use filesystem::{FilesystemAdapter, FilesystemConfig, HashAlgorithm};
pub use manager::StorageManager;
pub use memory::MemoryAdapter;
pub use retry::RetryConfig;

#[cfg(feature = "mongodb")]
pub use document::{MongoAdapter, MongoConfig};
#[cfg(feature = "redis")]
pub use kv::{RedisAdapter, RedisConfig};

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use tessera_core::StorageAdapter;

/// Spawn the configured background cleanup for an adapter.
///
/// The startup sweep and the periodic task hold only a weak handle, so
/// neither keeps the adapter alive; the periodic task's handle lands in
/// `slot` for `close()` to abort. No task is spawned when both knobs are
/// off, which keeps plain constructors usable outside a runtime.
pub(crate) fn spawn_cleanup<A>(
    adapter: &Arc<A>,
    on_start: bool,
    interval_ms: Option<u64>,
    slot: &Mutex<Option<JoinHandle<()>>>,
) where
    A: StorageAdapter + 'static,
{
    if on_start {
        let weak = Arc::downgrade(adapter);
        tokio::spawn(async move {
            if let Some(adapter) = weak.upgrade() {
                if let Err(err) = adapter.cleanup().await {
                    tracing::warn!(error = %err, "startup cleanup failed");
                }
            }
        });
    }

    let Some(interval_ms) = interval_ms else {
        return;
    };
    let weak = Arc::downgrade(adapter);
    let handle = tokio::spawn(async move {
        let period = std::time::Duration::from_millis(interval_ms.max(1));
        loop {
            tokio::time::sleep(period).await;
            let Some(adapter) = weak.upgrade() else {
                break;
            };
            if let Err(err) = adapter.cleanup().await {
                tracing::warn!(error = %err, "periodic cleanup failed");
            }
        }
    });
    if let Ok(mut slot) = slot.lock() {
        *slot = Some(handle);
    }
}

/// Abort a previously spawned periodic cleanup task.
pub(crate) fn abort_cleanup(slot: &Mutex<Option<JoinHandle<()>>>) {
    if let Ok(mut slot) = slot.lock() {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
