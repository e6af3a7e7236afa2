//! Metadata-envelope chunking strategy.
//!
//! An over-budget envelope is split into a **core** chunk (identity fields
//! plus a pages summary and component/style counts), a **details** chunk
//! (editor and collaboration fields with the full component/style tables)
//! and, when a document tree is present, a **structure** chunk holding a
//! recursive abbreviation of it. The core is primary and links details then
//! structure.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tessera_core::estimate::exceeds;
use tessera_core::{
    id, Chunk, ChunkContext, ChunkError, ChunkResult, ChunkStrategy, ChunkType,
};

/// Fields kept on the core chunk.
const CORE_FIELDS: [&str; 6] = [
    "name",
    "lastModified",
    "version",
    "thumbnailUrl",
    "schemaVersion",
    "documentationLinks",
];

/// Fields kept on the details chunk.
const DETAIL_FIELDS: [&str; 8] = [
    "editorType",
    "linkAccess",
    "createdAt",
    "branches",
    "components",
    "styles",
    "users",
    "lastUser",
];

/// Children kept per node in the structure abbreviation.
const STRUCTURE_CHILD_LIMIT: usize = 10;

/// Strategy for document-envelope payloads.
pub struct MetadataStrategy;

impl MetadataStrategy {
    /// Create the metadata strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for MetadataStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStrategy for MetadataStrategy {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::Metadata
    }

    fn should_chunk(&self, data: &Value, ctx: &ChunkContext) -> bool {
        exceeds(data, ctx.max_size)
    }

    async fn chunk(&self, data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError> {
        split_metadata(data, ctx)
    }
}

/// Split an envelope under `ctx`. Shared with the optimizer's `split`.
pub(crate) fn split_metadata(data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError> {
    let envelope = data
        .as_object()
        .ok_or_else(|| ChunkError::InvalidInput("metadata envelope must be an object".into()))?;

    let core_id = id::generate(&ctx.file_key, ChunkType::Metadata, Some("core"));
    if let Some(source) = envelope.get("id").and_then(Value::as_str) {
        ctx.record(source.to_string(), core_id.clone());
    }

    if !exceeds(data, ctx.max_size) {
        let chunk = Chunk::new(core_id.clone(), ctx.file_key.clone(), ChunkType::Metadata, data.clone());
        return Ok(ChunkResult::new(vec![chunk], core_id));
    }

    let details_id = id::generate(&ctx.file_key, ChunkType::Metadata, Some("details"));
    let structure_id = id::generate(&ctx.file_key, ChunkType::Metadata, Some("structure"));

    // Core: identity fields, pages summary, component/style counts.
    let mut core = Map::new();
    for field in CORE_FIELDS {
        if let Some(value) = envelope.get(field) {
            core.insert(field.to_string(), value.clone());
        }
    }
    if let Some(pages) = envelope
        .get("document")
        .and_then(|doc| doc.get("children"))
        .and_then(Value::as_array)
    {
        let summary: Vec<Value> = pages.iter().map(page_summary).collect();
        core.insert("pages".to_string(), Value::Array(summary));
    }
    if let Some(count) = collection_len(envelope.get("components")) {
        core.insert("componentCount".to_string(), json!(count));
    }
    if let Some(count) = collection_len(envelope.get("styles")) {
        core.insert("styleCount".to_string(), json!(count));
    }

    // Details: editor and collaboration fields, full tables.
    let mut details = Map::new();
    for field in DETAIL_FIELDS {
        if let Some(value) = envelope.get(field) {
            details.insert(field.to_string(), value.clone());
        }
    }

    let structure = envelope.get("document").map(abbreviate);

    let mut links = vec![details_id.clone()];
    if structure.is_some() {
        links.push(structure_id.clone());
    }

    let mut core_chunk = Chunk::new(
        core_id.clone(),
        ctx.file_key.clone(),
        ChunkType::Metadata,
        Value::Object(core),
    );
    core_chunk.links = links;

    let mut chunks = vec![
        core_chunk,
        Chunk::new(
            details_id,
            ctx.file_key.clone(),
            ChunkType::Metadata,
            Value::Object(details),
        ),
    ];
    if let Some(structure) = structure {
        chunks.push(Chunk::new(
            structure_id,
            ctx.file_key.clone(),
            ChunkType::Metadata,
            structure,
        ));
    }

    Ok(ChunkResult::new(chunks, core_id))
}

fn page_summary(page: &Value) -> Value {
    json!({
        "id": page.get("id").cloned().unwrap_or(Value::Null),
        "name": page.get("name").cloned().unwrap_or(Value::Null),
        "type": page.get("type").cloned().unwrap_or(Value::Null),
    })
}

fn collection_len(value: Option<&Value>) -> Option<usize> {
    match value {
        Some(Value::Object(map)) => Some(map.len()),
        Some(Value::Array(items)) => Some(items.len()),
        _ => None,
    }
}

/// Recursive abbreviation: `{id, name, type}` per node, at most the first
/// ten children; when truncated the original `childrenCount` is recorded.
fn abbreviate(node: &Value) -> Value {
    let mut out = Map::new();
    for field in ["id", "name", "type"] {
        if let Some(value) = node.get(field) {
            out.insert(field.to_string(), value.clone());
        }
    }
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        let kept: Vec<Value> = children
            .iter()
            .take(STRUCTURE_CHILD_LIMIT)
            .map(abbreviate)
            .collect();
        if children.len() > STRUCTURE_CHILD_LIMIT {
            out.insert("childrenCount".to_string(), json!(children.len()));
        }
        out.insert("children".to_string(), Value::Array(kept));
    }
    Value::Object(out)
}
