//! Integration tests for the full tessera pipeline.
//!
//! Tests the complete flow: chunk → persist → fetch → follow links, over
//! the memory and filesystem adapters.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::tempdir;

use tessera::service::DocumentService;
use tessera_chunker::Chunker;
use tessera_core::estimate::estimate;
use tessera_core::{
    Chunk, ChunkFilter, ChunkType, ChunkerConfig, OptimizationLevel, StorageAdapter,
};
use tessera_store::{FilesystemAdapter, FilesystemConfig, MemoryAdapter};

const MAX_SIZE: usize = 4096;

fn chunker() -> Chunker {
    Chunker::new(ChunkerConfig {
        max_chunk_size: MAX_SIZE,
        optimization_level: OptimizationLevel::None,
        ..Default::default()
    })
}

fn design_document() -> Value {
    let rectangles: Vec<Value> = (0..12)
        .map(|i| {
            json!({
                "id": format!("1:{i}"),
                "name": format!("Rect {i}"),
                "type": "RECTANGLE",
                "fills": [{"type": "SOLID", "color": "c".repeat(2000)}]
            })
        })
        .collect();
    json!({
        "id": "0:1",
        "name": "Page 1",
        "type": "PAGE",
        "children": rectangles
    })
}

fn global_variables() -> Value {
    let mut vars = Map::new();
    for i in 0..100 {
        vars.insert(
            format!("color-{i}"),
            json!({
                "name": format!("Color {i}"),
                "type": "COLOR",
                "value": {"r": 0.1, "g": 0.2, "b": 0.3},
                "description": "d".repeat(120)
            }),
        );
    }
    for i in 0..10 {
        vars.insert(
            format!("float-{i}"),
            json!({"name": format!("Spacing {i}"), "type": "FLOAT", "value": 8}),
        );
    }
    json!({"variables": vars})
}

#[tokio::test]
async fn test_ingest_and_fetch_over_memory() {
    let service = DocumentService::new(chunker(), Arc::new(MemoryAdapter::new()));

    let summary = service
        .ingest(&design_document(), "file-1", None)
        .await
        .unwrap();
    assert_eq!(summary.total_chunks, 13);
    // Node id 0:1 is sanitized into the identifier segment
    assert_eq!(summary.first_chunk_id, "file-1:node:0-1");

    // The primary fetch yields the page with reference-object children
    let primary = service
        .fetch("file-1", &summary.first_chunk_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(primary.total_chunks, 13);
    assert_eq!(primary.nodes.len(), 1);
    let children = primary.nodes[0]["children"].as_array().unwrap();
    assert!(children.iter().all(|c| c.get("chunkId").is_some()));

    // Every link resolves
    let mut cursor = primary.next_chunk_id.clone();
    let mut visited = 0;
    while let Some(chunk_id) = cursor {
        let step = service.fetch("file-1", &chunk_id).await.unwrap().unwrap();
        visited += 1;
        cursor = step.next_chunk_id;
        if visited > 20 {
            panic!("link walk did not terminate");
        }
    }
    assert_eq!(visited, 1, "leaf chunks do not chain further");
}

#[tokio::test]
async fn test_ingest_and_fetch_over_filesystem() {
    let dir = tempdir().unwrap();
    let storage = FilesystemAdapter::connect(FilesystemConfig {
        base_path: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();
    let service = DocumentService::new(chunker(), storage.clone());

    let summary = service
        .ingest(&design_document(), "file-1", None)
        .await
        .unwrap();

    // Every chunk is on disk and under budget
    for outline in &summary.structure_summary {
        assert!(storage.has(&outline.id).await.unwrap());
        assert!(outline.size <= MAX_SIZE + 2048, "{} far over budget", outline.id);
    }

    let fetched = service
        .fetch("file-1", &summary.first_chunk_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.chunk_id, summary.first_chunk_id);
    assert_eq!(fetched.total_chunks, 13);
}

#[tokio::test]
async fn test_global_vars_partitioned_end_to_end() {
    let service = DocumentService::new(chunker(), Arc::new(MemoryAdapter::new()));

    let summary = service
        .ingest(&global_variables(), "file-2", None)
        .await
        .unwrap();
    assert_eq!(summary.first_chunk_id, "file-2:globalVars:index");
    assert!(summary.total_chunks > 2);

    let index = service
        .fetch("file-2", &summary.first_chunk_id)
        .await
        .unwrap()
        .unwrap();
    let vars = index.global_vars.unwrap();
    assert_eq!(vars["COLOR"], json!("file-2:globalVars:COLOR-0"));
    assert_eq!(vars["FLOAT"], json!("file-2:globalVars:FLOAT"));

    // Each partition chunk respects the budget
    let listed = service
        .fetch("file-2", vars["COLOR"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(estimate(&listed.global_vars.unwrap()) <= MAX_SIZE);
}

#[tokio::test]
async fn test_metadata_envelope_end_to_end() {
    let service = DocumentService::new(chunker(), Arc::new(MemoryAdapter::new()));

    let components: Map<String, Value> = (0..200)
        .map(|i| {
            (
                format!("c{i}"),
                json!({"name": format!("Component {i}"), "key": "k".repeat(40)}),
            )
        })
        .collect();
    let envelope = json!({
        "name": "file",
        "version": "9",
        "schemaVersion": 14,
        "lastModified": "2026-07-01T00:00:00Z",
        "components": components,
        "document": {
            "name": "Document",
            "type": "DOCUMENT",
            "children": [{"id": "p1", "name": "Page 1", "type": "PAGE"}]
        }
    });

    let summary = service.ingest(&envelope, "file-3", None).await.unwrap();
    assert_eq!(summary.total_chunks, 3);
    let metadata = summary.metadata.unwrap();
    assert_eq!(metadata["componentCount"], json!(200));
    assert_eq!(metadata["pages"][0]["id"], json!("p1"));

    let core = service
        .fetch("file-3", &summary.first_chunk_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        core.next_chunk_id.as_deref(),
        Some("file-3:metadata:details")
    );
}

#[tokio::test]
async fn test_expired_chunk_vanishes_from_filesystem() {
    let dir = tempdir().unwrap();
    let storage = FilesystemAdapter::connect(FilesystemConfig {
        base_path: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut chunk = Chunk::new(
        "file-4:node:gone".to_string(),
        "file-4".to_string(),
        ChunkType::Node,
        json!({"id": "gone"}),
    );
    chunk.expires = Some(Utc::now() - Duration::milliseconds(1));
    storage.save(&chunk).await.unwrap();

    assert!(storage.get("file-4:node:gone").await.unwrap().is_none());
    // The backing file is gone too: nothing is listed even with expiry included
    let all = storage
        .list(Some(ChunkFilter {
            include_expired: true,
            ..Default::default()
        }))
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_storage_round_trip_preserves_chunk() {
    let dir = tempdir().unwrap();
    let storage = FilesystemAdapter::connect(FilesystemConfig {
        base_path: dir.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut chunk = Chunk::new(
        "file-5:globalVars:index".to_string(),
        "file-5".to_string(),
        ChunkType::GlobalVars,
        json!({"COLOR": "file-5:globalVars:COLOR-0"}),
    );
    chunk.links = vec!["file-5:globalVars:COLOR-0".to_string()];
    chunk.expires = Some(Utc::now() + Duration::hours(2));
    storage.save(&chunk).await.unwrap();

    let loaded = storage.get(&chunk.id).await.unwrap().unwrap();
    // Byte-equal modulo lastAccessed
    assert_eq!(loaded.id, chunk.id);
    assert_eq!(loaded.file_key, chunk.file_key);
    assert_eq!(loaded.chunk_type, chunk.chunk_type);
    assert_eq!(loaded.data, chunk.data);
    assert_eq!(loaded.links, chunk.links);
    assert_eq!(
        loaded.created.timestamp_millis(),
        chunk.created.timestamp_millis()
    );
    assert_eq!(
        loaded.expires.map(|dt| dt.timestamp_millis()),
        chunk.expires.map(|dt| dt.timestamp_millis())
    );
    assert!(loaded.last_accessed >= chunk.last_accessed);
}
