//! Chunking orchestrator.
//!
//! Detects the payload type, dispatches to the registered strategy, then
//! post-processes the result: reference-graph registration, per-chunk
//! optimization, cycle warnings and metrics. A `&self` receiver stays usable
//! across tasks; each chunking call is independent and only the shared
//! graph/metrics instances are synchronized.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use tessera_core::estimate::estimate;
use tessera_core::{
    ChunkContext, ChunkError, ChunkResult, ChunkType, ChunkerConfig, OptimizationLevel,
};

use crate::graph::ReferenceGraph;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::optimizer::ChunkOptimizer;
use crate::registry::StrategyRegistry;

/// Orchestrator over the strategy registry, optimizer, reference graph and
/// metrics collector.
pub struct Chunker {
    config: ChunkerConfig,
    strategies: StrategyRegistry,
    optimizer: ChunkOptimizer,
    graph: Mutex<ReferenceGraph>,
    metrics: Mutex<MetricsCollector>,
}

impl Chunker {
    /// Create a chunker with the built-in strategies.
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self::with_strategies(config, StrategyRegistry::with_defaults())
    }

    /// Create a chunker over a custom strategy registry.
    #[must_use]
    pub fn with_strategies(config: ChunkerConfig, strategies: StrategyRegistry) -> Self {
        let optimizer = ChunkOptimizer::new(config.max_chunk_size);
        Self {
            config,
            strategies,
            optimizer,
            graph: Mutex::new(ReferenceGraph::new()),
            metrics: Mutex::new(MetricsCollector::new()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Detect the payload type by structural heuristics, in order:
    /// variable dictionaries, then node shapes, then metadata envelopes,
    /// defaulting to metadata.
    #[must_use]
    pub fn detect_type(data: &Value) -> ChunkType {
        let has_variables = data
            .get("variables")
            .or_else(|| data.get("localVariables"))
            .is_some_and(|v| v.is_object() || v.is_array());
        let is_typed_array = data
            .as_array()
            .is_some_and(|items| !items.is_empty() && items.iter().all(|i| i.get("type").is_some()));
        if has_variables || is_typed_array {
            return ChunkType::GlobalVars;
        }

        let is_node = data.get("id").is_some()
            && data.get("type").is_some_and(Value::is_string);
        let is_document_wrapper = data
            .get("document")
            .is_some_and(|doc| doc.get("id").is_some() && doc.get("children").is_some());
        if is_node || is_document_wrapper {
            return ChunkType::Node;
        }

        let has_name = data.get("name").is_some();
        if has_name
            && (data.get("schemaVersion").is_some()
                || (data.get("lastModified").is_some() && data.get("version").is_some()))
        {
            return ChunkType::Metadata;
        }

        ChunkType::Metadata
    }

    /// Chunk a raw document.
    ///
    /// Uses `type_hint` when given, otherwise auto-detects. The returned
    /// chunks are topologically ordered with the primary first and already
    /// rewritten at the configured optimization level.
    pub async fn chunk(
        &self,
        data: &Value,
        file_key: &str,
        type_hint: Option<ChunkType>,
    ) -> Result<ChunkResult, ChunkError> {
        let chunk_type = type_hint.unwrap_or_else(|| Self::detect_type(data));
        let strategy = self
            .strategies
            .get(chunk_type)
            .ok_or(ChunkError::NoStrategy(chunk_type))?;

        if self.config.debug {
            debug!(%chunk_type, %file_key, "dispatching chunking strategy");
        }

        let ctx = ChunkContext::new(file_key, self.config.max_chunk_size);
        let started = Instant::now();
        let mut result = strategy.chunk(data, &ctx).await?;

        {
            let mut graph = lock(&self.graph);
            for chunk in &result.chunks {
                graph.add_node(chunk.id.clone(), None);
                for link in &chunk.links {
                    graph.add_reference(chunk.id.clone(), link.clone());
                }
            }
        }

        if self.config.optimization_level != OptimizationLevel::None {
            result.chunks = result
                .chunks
                .iter()
                .map(|chunk| {
                    let optimized = self.optimizer.optimize(chunk, self.config.optimization_level);
                    let size = estimate(&optimized.data);
                    if size > self.config.max_chunk_size {
                        warn!(
                            chunk_id = %optimized.id,
                            size,
                            budget = self.config.max_chunk_size,
                            "chunk exceeds budget after optimization"
                        );
                    }
                    optimized
                })
                .collect();
        }

        if self.config.detect_circular_refs {
            let cycles = lock(&self.graph).detect_cycles();
            for cycle in &cycles {
                warn!(cycle = %cycle.join(" -> "), "circular chunk reference");
            }
        }

        if self.config.collect_metrics {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let mut metrics = lock(&self.metrics);
            metrics.record_processing_time(chunk_type, elapsed_ms);
            metrics.record_chunk_count(chunk_type, result.chunks.len());
            for chunk in &result.chunks {
                metrics.record_chunk_size(chunk_type, estimate(&chunk.data));
            }
        }

        Ok(result)
    }

    /// Snapshot of the accumulated reference graph.
    #[must_use]
    pub fn graph_export(&self) -> HashMap<String, Vec<String>> {
        lock(&self.graph).export()
    }

    /// Every cycle currently present in the reference graph.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        lock(&self.graph).detect_cycles()
    }

    /// Snapshot of the accumulated metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        lock(&self.metrics).statistics()
    }

    /// Empty every metrics bucket.
    pub fn reset_metrics(&self) {
        lock(&self.metrics).reset();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
