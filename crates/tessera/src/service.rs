//! Gateway-facing document service.
//!
//! Implements the two logical operations the tool-call gateway consumes:
//! ingest (chunk a raw document and persist every piece) and fetch (resolve
//! one chunk and point at the next). Transport framing stays with the
//! gateway.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use tessera_chunker::Chunker;
use tessera_core::{ChunkFilter, ChunkType, Error, StorageAdapter};

/// One row of the ingest summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkOutline {
    pub id: String,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub size: usize,
}

/// Result of ingesting a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub file_key: String,
    pub first_chunk_id: String,
    pub total_chunks: usize,
    /// Primary payload when the document chunked as metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub structure_summary: Vec<ChunkOutline>,
}

/// Result of fetching one chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub file_key: String,
    pub chunk_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_chunk_id: Option<String>,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_vars: Option<Value>,
    pub nodes: Vec<Value>,
}

/// Chunking plus persistence behind one facade.
pub struct DocumentService {
    chunker: Chunker,
    storage: Arc<dyn StorageAdapter>,
}

impl DocumentService {
    /// Create a service over a chunker and a storage adapter.
    #[must_use]
    pub fn new(chunker: Chunker, storage: Arc<dyn StorageAdapter>) -> Self {
        Self { chunker, storage }
    }

    /// The underlying chunker, for graph and metrics inspection.
    #[must_use]
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk `data` and persist every produced chunk.
    ///
    /// Nothing is persisted when chunking fails. A failed save mid-batch
    /// may leave earlier chunks stored; retrying with the same document
    /// upserts over them.
    pub async fn ingest(
        &self,
        data: &Value,
        file_key: &str,
        type_hint: Option<ChunkType>,
    ) -> Result<IngestSummary, Error> {
        let result = self.chunker.chunk(data, file_key, type_hint).await?;

        for chunk in &result.chunks {
            self.storage.save(chunk).await?;
        }

        let primary = result.primary();
        let metadata = primary
            .filter(|c| c.chunk_type == ChunkType::Metadata)
            .map(|c| c.data.clone());
        let structure_summary = result
            .chunks
            .iter()
            .map(|chunk| ChunkOutline {
                id: chunk.id.clone(),
                chunk_type: chunk.chunk_type,
                size: chunk.size(),
            })
            .collect();

        info!(
            file_key,
            chunks = result.chunks.len(),
            primary = %result.primary_chunk_id,
            "ingested document"
        );

        Ok(IngestSummary {
            file_key: file_key.to_string(),
            first_chunk_id: result.primary_chunk_id,
            total_chunks: result.chunks.len(),
            metadata,
            structure_summary,
        })
    }

    /// Resolve one chunk; `None` when it is absent or expired.
    ///
    /// `next_chunk_id` walks the chunk's links in order, giving the
    /// gateway a simple streaming cursor.
    pub async fn fetch(&self, file_key: &str, chunk_id: &str) -> Result<Option<FetchResult>, Error> {
        let Some(chunk) = self.storage.get(chunk_id).await? else {
            return Ok(None);
        };

        let file_filter = ChunkFilter {
            file_key: Some(file_key.to_string()),
            limit: usize::MAX,
            ..Default::default()
        };
        let total_chunks = self.storage.list(Some(file_filter)).await?.len();

        let mut result = FetchResult {
            file_key: file_key.to_string(),
            chunk_id: chunk.id.clone(),
            next_chunk_id: chunk.links.first().cloned(),
            total_chunks,
            metadata: None,
            global_vars: None,
            nodes: Vec::new(),
        };
        match chunk.chunk_type {
            ChunkType::Metadata => result.metadata = Some(chunk.data),
            ChunkType::GlobalVars => result.global_vars = Some(chunk.data),
            ChunkType::Node => result.nodes.push(chunk.data),
        }

        Ok(Some(result))
    }
}
