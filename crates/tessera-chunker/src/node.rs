//! Node-tree chunking strategy.
//!
//! Splits a document node into a primary chunk plus one chunk per extracted
//! child. Extracted children are replaced in the parent's `children` array
//! by a reference object `{id, name, type, chunkId}`, and the parent's
//! `links` carries the extracted ids together with their transitive
//! references. Children are processed after the parent's id is assigned, so
//! recursion over the shared id map is well-defined.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use tessera_core::estimate::should_split_node;
use tessera_core::{
    collect_references, id, Chunk, ChunkContext, ChunkError, ChunkResult, ChunkStrategy, ChunkType,
};

/// Recursion cap; deeper input is malformed or adversarial.
pub(crate) const MAX_DEPTH: usize = 100;

/// Strategy for node-tree payloads.
pub struct NodeStrategy;

impl NodeStrategy {
    /// Create the node strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for NodeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStrategy for NodeStrategy {
    fn chunk_type(&self) -> ChunkType {
        ChunkType::Node
    }

    fn should_chunk(&self, data: &Value, ctx: &ChunkContext) -> bool {
        should_split_node(data, ctx.max_size)
    }

    async fn chunk(&self, data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError> {
        split_node(data, ctx)
    }
}

/// Split a node value under `ctx`. Shared with the optimizer's `split`.
pub(crate) fn split_node(data: &Value, ctx: &ChunkContext) -> Result<ChunkResult, ChunkError> {
    let chunks = split_node_inner(data, ctx, None)?;
    let primary_id = chunks[0].id.clone();
    Ok(ChunkResult::new(chunks, primary_id))
}

/// Recursive worker; returns the node's chunk first, dependents after.
fn split_node_inner(
    data: &Value,
    ctx: &ChunkContext,
    assigned_id: Option<String>,
) -> Result<Vec<Chunk>, ChunkError> {
    if ctx.depth > MAX_DEPTH {
        return Err(ChunkError::DepthExceeded {
            depth: ctx.depth,
            max: MAX_DEPTH,
        });
    }

    let source_id = data.get("id").and_then(Value::as_str).map(str::to_string);

    // Assign the chunk id up-front so descendants and siblings can link to it.
    let chunk_id = assigned_id
        .or_else(|| source_id.as_deref().and_then(|s| ctx.lookup(s)))
        .unwrap_or_else(|| {
            let identifier = source_id
                .clone()
                .unwrap_or_else(|| format!("node-{}", Utc::now().timestamp_millis()));
            id::generate(&ctx.file_key, ChunkType::Node, Some(&identifier))
        });
    if let Some(src) = &source_id {
        ctx.record(src.clone(), chunk_id.clone());
    }

    if !should_split_node(data, ctx.max_size) {
        return Ok(vec![Chunk::new(
            chunk_id,
            ctx.file_key.clone(),
            ChunkType::Node,
            data.clone(),
        )]);
    }

    let mut node = data.clone();
    // (extracted child value, its pre-assigned chunk id)
    let mut extracted: Vec<(Value, String)> = Vec::new();

    if let Some(children) = node.get_mut("children").and_then(Value::as_array_mut) {
        // A splitting parent shares its budget among the children; a child
        // stays inline only when it fits its share.
        let child_budget = ctx.max_size / children.len().max(1);
        for child in children.iter_mut() {
            if !should_split_node(child, child_budget) {
                continue;
            }

            let child_source = child.get("id").and_then(Value::as_str).map(str::to_string);
            let child_chunk_id = match child_source.as_deref().and_then(|s| ctx.lookup(s)) {
                Some(existing) => existing,
                None => {
                    let identifier = child_source
                        .clone()
                        .unwrap_or_else(|| format!("node-{}", Utc::now().timestamp_millis()));
                    let fresh = id::generate(&ctx.file_key, ChunkType::Node, Some(&identifier));
                    if let Some(src) = &child_source {
                        ctx.record(src.clone(), fresh.clone());
                    }
                    fresh
                }
            };

            let reference = json!({
                "id": child.get("id").cloned().unwrap_or(Value::Null),
                "name": child.get("name").cloned().unwrap_or(Value::Null),
                "type": child.get("type").cloned().unwrap_or(Value::Null),
                "chunkId": child_chunk_id.clone(),
            });
            let original = std::mem::replace(child, reference);
            extracted.push((original, child_chunk_id));
        }
    }

    let mut links: Vec<String> = Vec::new();
    let mut dependents: Vec<Chunk> = Vec::new();

    for (child_value, child_chunk_id) in extracted {
        let segment = child_value
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| child_value.get("id").and_then(Value::as_str))
            .unwrap_or("node")
            .to_string();
        let child_ctx = ctx.child(chunk_id.clone(), segment);

        let child_chunks = split_node_inner(&child_value, &child_ctx, Some(child_chunk_id.clone()))?;
        push_unique(&mut links, child_chunk_id.clone());
        for reference in collect_references(&child_chunks, &child_chunk_id) {
            push_unique(&mut links, reference);
        }
        dependents.extend(child_chunks);
    }

    debug!(
        chunk_id = %chunk_id,
        extracted = dependents.len(),
        depth = ctx.depth,
        "split node"
    );

    let mut primary = Chunk::new(chunk_id, ctx.file_key.clone(), ChunkType::Node, node);
    primary.links = links;

    let mut chunks = Vec::with_capacity(1 + dependents.len());
    chunks.push(primary);
    chunks.extend(dependents);
    Ok(chunks)
}

fn push_unique(links: &mut Vec<String>, id: String) {
    if !links.contains(&id) {
        links.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle(id: &str, payload_len: usize) -> Value {
        json!({
            "id": id,
            "name": format!("Rect {id}"),
            "type": "RECTANGLE",
            "fills": [{"type": "SOLID", "color": "x".repeat(payload_len)}]
        })
    }

    fn frame_with_children(count: usize, payload_len: usize) -> Value {
        let children: Vec<Value> = (0..count)
            .map(|i| rectangle(&format!("r{i}"), payload_len))
            .collect();
        json!({
            "id": "root",
            "name": "Frame",
            "type": "FRAME",
            "children": children
        })
    }

    #[tokio::test]
    async fn test_small_node_single_chunk() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 10_000);
        let data = rectangle("n1", 10);

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.primary_chunk_id, "f:node:n1");
        assert!(result.references.is_empty());
        assert_eq!(result.chunks[0].data, data);
    }

    #[tokio::test]
    async fn test_node_without_id_gets_synthetic_identifier() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 10_000);
        let data = json!({"name": "anon", "type": "FRAME"});

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        let parsed = id::parse(&result.primary_chunk_id).unwrap();
        assert!(parsed.identifier.unwrap().starts_with("node-"));
    }

    #[tokio::test]
    async fn test_split_rewrites_children_to_references() {
        // 12 children of ~2KB each, 4KB budget: all extracted
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        let data = frame_with_children(12, 2000);

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        assert_eq!(result.chunks.len(), 13);
        assert_eq!(result.references.len(), 12);

        let primary = result.primary().unwrap();
        assert_eq!(primary.links.len(), 12);

        let children = primary.data["children"].as_array().unwrap();
        assert_eq!(children.len(), 12);
        for (i, child) in children.iter().enumerate() {
            assert_eq!(child["id"], json!(format!("r{i}")));
            assert!(child.get("chunkId").is_some(), "child {i} not a reference");
            assert!(child.get("fills").is_none(), "child {i} kept its payload");
            let chunk_id = child["chunkId"].as_str().unwrap();
            assert!(
                primary.links.contains(&chunk_id.to_string()),
                "chunkId of child {i} missing from links"
            );
        }
    }

    #[tokio::test]
    async fn test_small_children_stay_inline() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        // Big frame payload forces a split, but each child is tiny
        let mut data = frame_with_children(3, 10);
        data["name"] = json!("y".repeat(5000));

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        assert_eq!(result.chunks.len(), 1);
        let children = result.chunks[0].data["children"].as_array().unwrap();
        assert!(children.iter().all(|c| c.get("chunkId").is_none()));
    }

    #[tokio::test]
    async fn test_nested_split_links_are_transitive() {
        // root > page > 12 rectangles: root links page and, transitively,
        // every rectangle chunk
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        let mut page = frame_with_children(12, 2000);
        page["id"] = json!("page1");
        page["type"] = json!("PAGE");
        let data = json!({
            "id": "root",
            "name": "Document",
            "type": "DOCUMENT",
            "children": (0..11).map(|_| json!({"id": "pad"})).chain([page]).collect::<Vec<_>>()
        });

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        let primary = result.primary().unwrap();
        assert!(primary.links.contains(&"f:node:page1".to_string()));
        assert!(primary.links.contains(&"f:node:r0".to_string()));
        assert_eq!(result.references.len(), 13);
    }

    #[tokio::test]
    async fn test_id_map_registers_every_processed_node() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        let data = frame_with_children(12, 2000);

        strategy.chunk(&data, &ctx).await.unwrap();
        assert_eq!(ctx.lookup("root").as_deref(), Some("f:node:root"));
        assert_eq!(ctx.lookup("r0").as_deref(), Some("f:node:r0"));
        assert_eq!(ctx.lookup("r11").as_deref(), Some("f:node:r11"));
    }

    #[tokio::test]
    async fn test_repeated_source_id_reuses_chunk_id() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        ctx.record("r0", "f:node:seen-before");

        let data = frame_with_children(12, 2000);
        let result = strategy.chunk(&data, &ctx).await.unwrap();
        let primary = result.primary().unwrap();
        assert!(primary.links.contains(&"f:node:seen-before".to_string()));
    }

    #[tokio::test]
    async fn test_depth_cap() {
        let strategy = NodeStrategy::new();
        let mut ctx = ChunkContext::new("f", 4096);
        ctx.depth = MAX_DEPTH + 1;

        let err = strategy
            .chunk(&rectangle("n1", 10), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn test_chunks_topologically_ordered_primary_first() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 4096);
        let data = frame_with_children(12, 2000);

        let result = strategy.chunk(&data, &ctx).await.unwrap();
        assert_eq!(result.chunks[0].id, result.primary_chunk_id);
        // Dependents appear in the order the parent linked them
        let primary_links = result.primary().unwrap().links.clone();
        let dependent_ids: Vec<&str> = result.chunks[1..].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(primary_links, dependent_ids);
    }

    #[test]
    fn test_should_chunk_delegates_to_split_predicate() {
        let strategy = NodeStrategy::new();
        let ctx = ChunkContext::new("f", 64);
        assert!(strategy.should_chunk(&rectangle("n1", 500), &ctx));
        let ctx = ChunkContext::new("f", 100_000);
        assert!(!strategy.should_chunk(&rectangle("n1", 500), &ctx));
    }
}
