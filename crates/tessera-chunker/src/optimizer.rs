//! Chunk rewriting: compression, splitting and merging.
//!
//! Every operation returns a new value; inputs are never mutated. The
//! optimization levels are monotone — each keeps at most what the previous
//! one kept — and `High` is lossy: consumers that need a losslessly
//! reconstructible document must stay at `None` or `Low`.

use serde_json::{Map, Value};

use tessera_core::{
    id, Chunk, ChunkContext, ChunkError, ChunkType, OptimizationLevel,
};

use crate::globals::split_global_vars;
use crate::metadata::split_metadata;
use crate::node::split_node;

/// Keys dropped at `Low` and above, besides `_`-prefixed ones.
const LOW_DENY_LIST: [&str; 3] = ["thumbnailUrl", "documentationLinks", "editorType"];

/// Fields a node chunk keeps under compression.
const NODE_KEEP: [&str; 12] = [
    "id",
    "type",
    "name",
    "x",
    "y",
    "width",
    "height",
    "fills",
    "strokes",
    "cornerRadius",
    "blendMode",
    "children",
];

/// Fields a metadata chunk keeps under compression.
const METADATA_KEEP: [&str; 4] = ["name", "version", "schemaVersion", "lastModified"];

/// Chunk optimizer configured with a byte budget for `split`.
pub struct ChunkOptimizer {
    max_size: usize,
}

impl ChunkOptimizer {
    /// Create an optimizer with the given default split budget.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Rewrite a chunk at the given optimization level.
    #[must_use]
    pub fn optimize(&self, chunk: &Chunk, level: OptimizationLevel) -> Chunk {
        match level {
            OptimizationLevel::None => chunk.clone(),
            OptimizationLevel::Low => {
                let mut out = chunk.clone();
                out.data = prune(&chunk.data);
                out
            }
            OptimizationLevel::Medium => self.compress(chunk),
            OptimizationLevel::High => {
                let mut out = self.compress(chunk);
                out.data = strip_private_keys(&out.data);
                out
            }
        }
    }

    /// Type-specific compression.
    #[must_use]
    pub fn compress(&self, chunk: &Chunk) -> Chunk {
        let mut out = chunk.clone();
        out.data = match chunk.chunk_type {
            ChunkType::Node => compress_node(&chunk.data),
            ChunkType::Metadata => compress_metadata(&chunk.data),
            ChunkType::GlobalVars => compress_global_vars(&chunk.data),
        };
        out
    }

    /// Split a chunk into budget-sized pieces using the type's own rules.
    ///
    /// When no type-aware rule applies to the payload, the chunk is returned
    /// unchanged as a singleton.
    #[must_use]
    pub fn split(&self, chunk: &Chunk, max: usize) -> Vec<Chunk> {
        let ctx = ChunkContext::new(chunk.file_key.clone(), max);
        let result = match chunk.chunk_type {
            ChunkType::Node => split_node(&chunk.data, &ctx),
            ChunkType::Metadata => split_metadata(&chunk.data, &ctx),
            ChunkType::GlobalVars => split_global_vars(&chunk.data, &ctx),
        };
        match result {
            Ok(result) => result.chunks,
            Err(_) => vec![chunk.clone()],
        }
    }

    /// Split under the configured default budget.
    #[must_use]
    pub fn split_default(&self, chunk: &Chunk) -> Vec<Chunk> {
        self.split(chunk, self.max_size)
    }

    /// Reverse a split: reassemble one chunk from a primary plus its
    /// dependents.
    ///
    /// # Errors
    /// `ChunkError::InvalidInput` when `chunks` is empty.
    pub fn merge(&self, chunks: &[Chunk]) -> Result<Chunk, ChunkError> {
        let primary = chunks
            .first()
            .ok_or_else(|| ChunkError::InvalidInput("cannot merge empty chunk set".into()))?;

        let merged = match primary.chunk_type {
            ChunkType::Node => merge_node(primary, &chunks[1..]),
            ChunkType::Metadata => merge_metadata(primary, &chunks[1..]),
            ChunkType::GlobalVars => merge_global_vars(primary, &chunks[1..]),
        };
        Ok(merged)
    }
}

// ============================================================================
// Level rewrites
// ============================================================================

/// Low-level pruning: drop `_`-prefixed keys, the deny-list, and null
/// values; recurse into sub-containers.
fn prune(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .iter()
                .filter(|(key, val)| {
                    !key.starts_with('_') && !LOW_DENY_LIST.contains(&key.as_str()) && !val.is_null()
                })
                .map(|(key, val)| (key.clone(), prune(val)))
                .collect();
            Value::Object(kept)
        }
        Value::Array(items) => Value::Array(items.iter().map(prune).collect()),
        other => other.clone(),
    }
}

/// Remove every `_`-prefixed key at any depth.
fn strip_private_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .map(|(key, val)| (key.clone(), strip_private_keys(val)))
                .collect();
            Value::Object(kept)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_private_keys).collect()),
        other => other.clone(),
    }
}

// ============================================================================
// Type-specific compression
// ============================================================================

fn compress_node(data: &Value) -> Value {
    let Some(map) = data.as_object() else {
        return data.clone();
    };
    let mut out = Map::new();
    for field in NODE_KEEP {
        if field == "children" {
            // Children collapse to an empty sequence; the wrapping chunk's
            // links still point at the extracted pieces.
            if map.contains_key("children") {
                out.insert("children".to_string(), Value::Array(Vec::new()));
            }
            continue;
        }
        if let Some(value) = map.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

fn compress_metadata(data: &Value) -> Value {
    let Some(map) = data.as_object() else {
        return data.clone();
    };
    let mut out = Map::new();
    for field in METADATA_KEEP {
        if let Some(value) = map.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }
    for table in ["components", "styles"] {
        if let Some(entries) = map.get(table) {
            out.insert(table.to_string(), reduce_to_names(entries));
        }
    }
    Value::Object(out)
}

fn reduce_to_names(entries: &Value) -> Value {
    let name_only = |entry: &Value| -> Value {
        match entry.get("name") {
            Some(name) => serde_json::json!({"name": name}),
            None => serde_json::json!({}),
        }
    };
    match entries {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, entry)| (key.clone(), name_only(entry)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|entry| name_only(entry)).collect()),
        other => other.clone(),
    }
}

fn compress_global_vars(data: &Value) -> Value {
    let Some(map) = data.as_object() else {
        return data.clone();
    };
    let compressed: Map<String, Value> = map
        .iter()
        .map(|(key, var)| {
            let Some(fields) = var.as_object() else {
                // Index entries are plain chunk-id strings; leave them be.
                return (key.clone(), var.clone());
            };
            let mut out = Map::new();
            for field in ["name", "type", "valuesByMode"] {
                if let Some(value) = fields.get(field) {
                    out.insert(field.to_string(), value.clone());
                }
            }
            (key.clone(), Value::Object(out))
        })
        .collect();
    Value::Object(compressed)
}

// ============================================================================
// Merge
// ============================================================================

fn merge_node(primary: &Chunk, dependents: &[Chunk]) -> Chunk {
    let by_id: std::collections::HashMap<&str, &Chunk> =
        dependents.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut merged = primary.clone();
    let children = merged
        .data
        .as_object_mut()
        .and_then(|map| map.get_mut("children"));

    if let Some(Value::Array(children)) = children {
        if children.is_empty() {
            // Compressed form: re-attach payloads in link order.
            for link in &primary.links {
                if let Some(dep) = by_id.get(link.as_str()) {
                    children.push(dep.data.clone());
                }
            }
        } else {
            for child in children.iter_mut() {
                let Some(chunk_id) = child.get("chunkId").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(dep) = by_id.get(chunk_id) {
                    *child = dep.data.clone();
                }
            }
        }
    }

    merged.links = Vec::new();
    merged
}

fn merge_metadata(primary: &Chunk, dependents: &[Chunk]) -> Chunk {
    let mut out = Map::new();

    for dep in dependents {
        let is_structure = id::parse(&dep.id)
            .ok()
            .and_then(|parsed| parsed.identifier)
            .is_some_and(|ident| ident == "structure");
        if is_structure {
            out.insert("document".to_string(), dep.data.clone());
        } else if let Some(map) = dep.data.as_object() {
            for (key, value) in map {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    // Core wins on collision.
    if let Some(map) = primary.data.as_object() {
        for (key, value) in map {
            out.insert(key.clone(), value.clone());
        }
    }

    let mut merged = primary.clone();
    merged.data = Value::Object(out);
    merged.links = Vec::new();
    merged
}

fn merge_global_vars(primary: &Chunk, dependents: &[Chunk]) -> Chunk {
    let mut variables = Map::new();

    let sources: Vec<&Chunk> = if dependents.is_empty() {
        vec![primary]
    } else {
        dependents.iter().collect()
    };
    for chunk in sources {
        if let Some(map) = chunk.data.as_object() {
            for (key, value) in map {
                if value.is_object() {
                    variables.insert(key.clone(), value.clone());
                }
            }
        }
    }

    let mut merged = primary.clone();
    merged.data = Value::Object(variables);
    merged.links = Vec::new();
    merged
}
