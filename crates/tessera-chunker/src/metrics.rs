//! In-memory metrics for chunking operations.
//!
//! Buckets are dense: every known [`ChunkType`] has an entry after `new()`
//! and after `reset()`, even when empty. Not thread-safe by contract;
//! callers confine an instance to one task or wrap it.

use serde::Serialize;
use std::collections::HashMap;

use tessera_core::ChunkType;

/// Raw per-type observation buckets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeMetrics {
    /// Wall time of each chunking call, milliseconds
    pub processing_times_ms: Vec<f64>,
    /// Serialized size of each produced chunk, bytes
    pub chunk_sizes: Vec<usize>,
    /// Chunk count of each chunking call
    pub chunk_counts: Vec<usize>,
}

/// Computed view over one type's buckets.
#[derive(Debug, Clone, Serialize)]
pub struct TypeStatistics {
    #[serde(flatten)]
    pub raw: TypeMetrics,
    pub average_time_ms: f64,
    pub average_size: f64,
    /// Total chunks produced for this type
    pub chunk_count: usize,
}

/// Snapshot returned by [`MetricsCollector::statistics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub per_type: HashMap<ChunkType, TypeStatistics>,
    /// Sum of chunk counts across every type
    pub total_chunks: usize,
}

/// Collector of per-type timing, size and count observations.
#[derive(Debug)]
pub struct MetricsCollector {
    buckets: HashMap<ChunkType, TypeMetrics>,
}

impl MetricsCollector {
    /// Create a collector with a dense, empty bucket per known type.
    #[must_use]
    pub fn new() -> Self {
        let mut buckets = HashMap::new();
        for ty in ChunkType::ALL {
            buckets.insert(ty, TypeMetrics::default());
        }
        Self { buckets }
    }

    fn bucket(&mut self, ty: ChunkType) -> &mut TypeMetrics {
        self.buckets.entry(ty).or_default()
    }

    /// Record the wall time of one chunking call.
    pub fn record_processing_time(&mut self, ty: ChunkType, millis: f64) {
        self.bucket(ty).processing_times_ms.push(millis);
    }

    /// Record the serialized size of one produced chunk.
    pub fn record_chunk_size(&mut self, ty: ChunkType, bytes: usize) {
        self.bucket(ty).chunk_sizes.push(bytes);
    }

    /// Record the chunk count of one chunking call.
    pub fn record_chunk_count(&mut self, ty: ChunkType, count: usize) {
        self.bucket(ty).chunk_counts.push(count);
    }

    /// Raw arrays, per-type averages and counts, and the overall total.
    #[must_use]
    pub fn statistics(&self) -> MetricsSnapshot {
        let mut per_type = HashMap::new();
        let mut total_chunks = 0;

        for (ty, raw) in &self.buckets {
            let chunk_count: usize = raw.chunk_counts.iter().sum();
            total_chunks += chunk_count;
            per_type.insert(
                *ty,
                TypeStatistics {
                    raw: raw.clone(),
                    average_time_ms: average_f64(&raw.processing_times_ms),
                    average_size: average_usize(&raw.chunk_sizes),
                    chunk_count,
                },
            );
        }

        MetricsSnapshot {
            per_type,
            total_chunks,
        }
    }

    /// Empty every bucket, keeping the dense per-type layout.
    pub fn reset(&mut self) {
        for bucket in self.buckets.values_mut() {
            *bucket = TypeMetrics::default();
        }
        for ty in ChunkType::ALL {
            self.buckets.entry(ty).or_default();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn average_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn average_usize(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}
