//! Adapter registry with a configured default.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use tessera_core::{Chunk, ChunkFilter, ChunkSummary, StorageAdapter, StoreError};

/// Registry of named storage adapters.
///
/// Operations without an explicit adapter name go to the configured
/// default; `cleanup_all` fans out to every registered adapter.
pub struct StorageManager {
    adapters: HashMap<String, Arc<dyn StorageAdapter>>,
    default: Option<String>,
}

impl StorageManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            default: None,
        }
    }

    /// Register an adapter. The first registration becomes the default.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn StorageAdapter>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.adapters.insert(name, adapter);
    }

    /// Make a registered adapter the default.
    ///
    /// # Errors
    /// `StoreError::Permanent` when the name is unknown.
    pub fn set_default(&mut self, name: &str) -> Result<(), StoreError> {
        if !self.adapters.contains_key(name) {
            return Err(StoreError::Permanent(format!("unknown adapter: {name}")));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Look up an adapter by name, falling back to the default.
    ///
    /// # Errors
    /// `StoreError::Permanent` when the name (or default) is unknown.
    pub fn adapter(&self, name: Option<&str>) -> Result<Arc<dyn StorageAdapter>, StoreError> {
        let name = name
            .map(str::to_string)
            .or_else(|| self.default.clone())
            .ok_or_else(|| StoreError::Permanent("no default adapter configured".into()))?;
        self.adapters
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::Permanent(format!("unknown adapter: {name}")))
    }

    /// Registered adapter names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    // Thin delegations to the default adapter.

    pub async fn save(&self, chunk: &Chunk) -> Result<(), StoreError> {
        self.adapter(None)?.save(chunk).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        self.adapter(None)?.get(id).await
    }

    pub async fn has(&self, id: &str) -> Result<bool, StoreError> {
        self.adapter(None)?.has(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.adapter(None)?.delete(id).await
    }

    pub async fn list(&self, filter: Option<ChunkFilter>) -> Result<Vec<ChunkSummary>, StoreError> {
        self.adapter(None)?.list(filter).await
    }

    pub async fn cleanup(&self) -> Result<u64, StoreError> {
        self.adapter(None)?.cleanup().await
    }

    /// Run cleanup on every registered adapter concurrently.
    ///
    /// Per-adapter failures are logged and skipped; returns the total
    /// evicted across the adapters that succeeded.
    pub async fn cleanup_all(&self) -> u64 {
        let sweeps = self.adapters.values().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move { (adapter.name().to_string(), adapter.cleanup().await) }
        });

        let mut total = 0u64;
        for (name, outcome) in join_all(sweeps).await {
            match outcome {
                Ok(evicted) => {
                    debug!(adapter = %name, evicted, "cleanup finished");
                    total += evicted;
                }
                Err(err) => warn!(adapter = %name, error = %err, "cleanup failed"),
            }
        }
        total
    }

    /// Close every adapter and clear the registry.
    pub async fn dispose(&mut self) {
        let closes = self.adapters.values().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move { (adapter.name().to_string(), adapter.close().await) }
        });
        for (name, outcome) in join_all(closes).await {
            if let Err(err) = outcome {
                warn!(adapter = %name, error = %err, "close failed");
            }
        }
        self.adapters.clear();
        self.default = None;
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tessera_core::ChunkType;

    fn chunk(id: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            "f".to_string(),
            ChunkType::Node,
            json!({"id": "n"}),
        )
    }

    fn manager_with_memory() -> StorageManager {
        let mut manager = StorageManager::new();
        manager.register("memory", Arc::new(MemoryAdapter::new()));
        manager
    }

    #[test]
    fn test_first_registration_becomes_default() {
        let manager = manager_with_memory();
        assert_eq!(manager.adapter(None).unwrap().name(), "memory");
    }

    #[test]
    fn test_unknown_adapter_is_error() {
        let manager = manager_with_memory();
        assert!(manager.adapter(Some("missing")).is_err());
        assert!(StorageManager::new().adapter(None).is_err());
    }

    #[test]
    fn test_set_default() {
        let mut manager = manager_with_memory();
        manager.register("second", Arc::new(MemoryAdapter::new()));
        assert!(manager.set_default("second").is_ok());
        assert!(manager.set_default("missing").is_err());
    }

    #[tokio::test]
    async fn test_delegation_round_trip() {
        let manager = manager_with_memory();
        manager.save(&chunk("f:node:n1")).await.unwrap();

        assert!(manager.has("f:node:n1").await.unwrap());
        assert!(manager.get("f:node:n1").await.unwrap().is_some());
        assert_eq!(manager.list(None).await.unwrap().len(), 1);
        assert!(manager.delete("f:node:n1").await.unwrap());
        assert!(!manager.has("f:node:n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_all_fans_out() {
        let mut manager = StorageManager::new();
        let a = Arc::new(MemoryAdapter::new());
        let b = Arc::new(MemoryAdapter::new());

        let mut expired = chunk("f:node:old");
        expired.expires = Some(Utc::now() - Duration::milliseconds(1));
        a.save(&expired).await.unwrap();
        b.save(&expired).await.unwrap();
        b.save(&chunk("f:node:live")).await.unwrap();

        manager.register("a", a);
        manager.register("b", b);
        assert_eq!(manager.cleanup_all().await, 2);
    }

    #[tokio::test]
    async fn test_dispose_clears_registry() {
        let mut manager = manager_with_memory();
        manager.dispose().await;
        assert!(manager.adapter(None).is_err());
        assert!(manager.names().is_empty());
    }
}
