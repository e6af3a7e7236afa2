//! Strategy registry keyed by chunk type.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{ChunkStrategy, ChunkType};

use crate::globals::GlobalVarsStrategy;
use crate::metadata::MetadataStrategy;
use crate::node::NodeStrategy;

/// Tagged-dispatch registry of chunking strategies.
pub struct StrategyRegistry {
    strategies: HashMap<ChunkType, Arc<dyn ChunkStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with the three built-in strategies.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(NodeStrategy::new());
        registry.register(MetadataStrategy::new());
        registry.register(GlobalVarsStrategy::new());
        registry
    }

    /// Register a strategy under its own chunk type, replacing any previous
    /// registration for that type.
    pub fn register<S: ChunkStrategy + 'static>(&mut self, strategy: S) {
        self.strategies
            .insert(strategy.chunk_type(), Arc::new(strategy));
    }

    /// Look up the strategy for a chunk type.
    #[must_use]
    pub fn get(&self, ty: ChunkType) -> Option<Arc<dyn ChunkStrategy>> {
        self.strategies.get(&ty).cloned()
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(ChunkType::Node).is_none());
    }

    #[test]
    fn test_with_defaults_covers_every_type() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        for ty in ChunkType::ALL {
            let strategy = registry.get(ty).expect("strategy registered");
            assert_eq!(strategy.chunk_type(), ty);
        }
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = StrategyRegistry::with_defaults();
        registry.register(NodeStrategy::new());
        assert_eq!(registry.len(), 3);
    }
}
