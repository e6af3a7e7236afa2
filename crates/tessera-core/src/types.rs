//! Core types for tessera.
//!
//! This module contains the shared data structures used across tessera:
//!
//! ## Chunks
//! - [`Chunk`]: the fundamental persisted entity
//! - [`ChunkType`]: tagged variant (metadata, node, globalVars)
//! - [`ChunkSummary`]: projection used for listings
//! - [`ChunkResult`]: the output of one chunking invocation
//!
//! ## Queries
//! - [`ChunkFilter`]: predicate + ordering + truncation for listings
//! - [`SortField`], [`SortDirection`]: listing order
//!
//! ## Chunking
//! - [`ChunkContext`]: per-operation state propagated through strategies
//! - [`ChunkerConfig`], [`OptimizationLevel`]: budget and rewrite knobs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ChunkError;
use crate::estimate;

// ============================================================================
// Chunk Type
// ============================================================================

/// Tagged variant of a chunk payload.
///
/// The wire strings (`metadata`, `node`, `globalVars`) are part of the chunk
/// id format and must stay stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkType {
    /// Document envelope (name, version, pages summary, ...)
    #[serde(rename = "metadata")]
    Metadata,
    /// A node of the document tree
    #[serde(rename = "node")]
    Node,
    /// Global design variables (colors, text styles, effects, ...)
    #[serde(rename = "globalVars")]
    GlobalVars,
}

impl ChunkType {
    /// All known variants, in declaration order.
    pub const ALL: [ChunkType; 3] = [ChunkType::Metadata, ChunkType::Node, ChunkType::GlobalVars];

    /// Canonical wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Metadata => "metadata",
            ChunkType::Node => "node",
            ChunkType::GlobalVars => "globalVars",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = ChunkError;

    /// Case-insensitive: lowercased ids (`globalvars`) still resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metadata" => Ok(ChunkType::Metadata),
            "node" => Ok(ChunkType::Node),
            "globalvars" => Ok(ChunkType::GlobalVars),
            other => Err(ChunkError::InvalidInput(format!(
                "unknown chunk type: {other}"
            ))),
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// The fundamental persisted entity.
///
/// A chunk is the smallest independently addressable unit of design data.
/// Its `id` has the form `fileKey:type:identifier` and is stable for a given
/// triple; `links` names the chunks this one directly depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Globally unique id, `fileKey:type:identifier`
    pub id: String,
    /// Identifier of the source document
    pub file_key: String,
    /// Payload variant
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Creation timestamp (millisecond resolution)
    pub created: DateTime<Utc>,
    /// Last read timestamp; updated best-effort on `get`
    pub last_accessed: DateTime<Utc>,
    /// Expiry; when absent the adapter may apply a default TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// The chunk payload; shape depends on `chunk_type`
    pub data: Value,
    /// Chunk ids this chunk directly depends on, in link order
    #[serde(default)]
    pub links: Vec<String>,
}

impl Chunk {
    /// Create a chunk with fresh timestamps, no expiry and no links.
    #[must_use]
    pub fn new(id: String, file_key: String, chunk_type: ChunkType, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_key,
            chunk_type,
            created: now,
            last_accessed: now,
            expires: None,
            data,
            links: Vec::new(),
        }
    }

    /// Serialized size of the payload in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        estimate::estimate(&self.data)
    }

    /// Effective expiry: the explicit one, or `created + default_ttl`.
    #[must_use]
    pub fn expires_with_default(&self, default_ttl: Duration) -> DateTime<Utc> {
        self.expires.unwrap_or(self.created + default_ttl)
    }

    /// Whether the chunk has expired at `now` under the given default TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        self.expires_with_default(default_ttl) < now
    }

    /// Projection used for listings.
    #[must_use]
    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            id: self.id.clone(),
            file_key: self.file_key.clone(),
            chunk_type: self.chunk_type,
            created: self.created,
            size: self.size(),
        }
    }
}

/// Projection of a [`Chunk`] used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub id: String,
    pub file_key: String,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub created: DateTime<Utc>,
    pub size: usize,
}

// ============================================================================
// Filter
// ============================================================================

/// Field a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    FileKey,
    Type,
    #[default]
    Created,
    Size,
}

/// Listing order direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Query filter for chunk listings.
///
/// Every predicate is conjunctive; the result is ordered by
/// `sort_by`/`sort_direction` and truncated to `limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkFilter {
    pub file_key: Option<String>,
    #[serde(rename = "type")]
    pub chunk_type: Option<ChunkType>,
    /// Only chunks created strictly before this instant
    pub older_than: Option<DateTime<Utc>>,
    /// Only chunks created strictly after this instant
    pub newer_than: Option<DateTime<Utc>>,
    pub include_expired: bool,
    pub limit: usize,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
}

impl Default for ChunkFilter {
    fn default() -> Self {
        Self {
            file_key: None,
            chunk_type: None,
            older_than: None,
            newer_than: None,
            include_expired: false,
            limit: 100,
            sort_by: SortField::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

impl ChunkFilter {
    /// Whether `chunk` satisfies every predicate at `now`.
    #[must_use]
    pub fn matches(&self, chunk: &Chunk, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        if let Some(ref key) = self.file_key {
            if &chunk.file_key != key {
                return false;
            }
        }
        if let Some(ty) = self.chunk_type {
            if chunk.chunk_type != ty {
                return false;
            }
        }
        if let Some(older) = self.older_than {
            if chunk.created >= older {
                return false;
            }
        }
        if let Some(newer) = self.newer_than {
            if chunk.created <= newer {
                return false;
            }
        }
        if !self.include_expired && chunk.is_expired(now, default_ttl) {
            return false;
        }
        true
    }

    /// Sort and truncate summaries per this filter.
    pub fn order(&self, summaries: &mut Vec<ChunkSummary>) {
        summaries.sort_by(|a, b| {
            let ord = match self.sort_by {
                SortField::Id => a.id.cmp(&b.id),
                SortField::FileKey => a.file_key.cmp(&b.file_key),
                SortField::Type => a.chunk_type.as_str().cmp(b.chunk_type.as_str()),
                SortField::Created => a.created.cmp(&b.created),
                SortField::Size => a.size.cmp(&b.size),
            };
            match self.sort_direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        summaries.truncate(self.limit);
    }

    /// Filter, project, sort and truncate a set of chunks in one pass.
    ///
    /// In-memory listing path shared by the adapters that scan payloads.
    #[must_use]
    pub fn apply<'a, I>(&self, chunks: I, default_ttl: Duration) -> Vec<ChunkSummary>
    where
        I: IntoIterator<Item = &'a Chunk>,
    {
        let now = Utc::now();
        let mut summaries: Vec<ChunkSummary> = chunks
            .into_iter()
            .filter(|c| self.matches(c, now, default_ttl))
            .map(Chunk::summary)
            .collect();
        self.order(&mut summaries);
        summaries
    }
}

// ============================================================================
// Chunk Result
// ============================================================================

/// Output of one chunking invocation.
///
/// `chunks` is topologically ordered with the primary first; `references` is
/// the deduplicated set of ids reachable from the primary, excluding itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub chunks: Vec<Chunk>,
    pub primary_chunk_id: String,
    pub references: Vec<String>,
}

impl ChunkResult {
    /// Build a result, deriving `references` as the transitive closure of the
    /// primary's links restricted to ids present in `chunks`.
    #[must_use]
    pub fn new(chunks: Vec<Chunk>, primary_chunk_id: String) -> Self {
        let references = collect_references(&chunks, &primary_chunk_id);
        Self {
            chunks,
            primary_chunk_id,
            references,
        }
    }

    /// The primary chunk, if present in `chunks`.
    #[must_use]
    pub fn primary(&self) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == self.primary_chunk_id)
    }
}

/// Ids reachable from `primary_id` over `links`, restricted to `chunks`,
/// excluding the primary itself. Discovery order, deduplicated.
#[must_use]
pub fn collect_references(chunks: &[Chunk], primary_id: &str) -> Vec<String> {
    let by_id: HashMap<&str, &Chunk> = chunks.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    if let Some(primary) = by_id.get(primary_id) {
        for link in &primary.links {
            queue.push_back(link.as_str());
        }
    }
    seen.insert(primary_id);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(chunk) = by_id.get(id) {
            order.push(id.to_string());
            for link in &chunk.links {
                queue.push_back(link.as_str());
            }
        }
    }
    order
}

// ============================================================================
// Chunking Context
// ============================================================================

/// Shared source-id → chunk-id assignments.
///
/// Cloned handles observe each other's entries, so sibling strategies see
/// assignments made deeper in the tree.
pub type SharedIdMap = Arc<Mutex<HashMap<String, String>>>;

/// Per-operation state propagated through a chunking call.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    /// Source document identifier
    pub file_key: String,
    /// Serialized byte budget per chunk
    pub max_size: usize,
    /// Chunk id of the enclosing parent, if any
    pub parent_id: Option<String>,
    /// Node path from the root, outermost first
    pub path: Vec<String>,
    /// Recursion depth, 0 at the root
    pub depth: usize,
    /// Source-id to chunk-id assignments, shared across child contexts
    pub id_map: SharedIdMap,
}

impl ChunkContext {
    /// Root context for a fresh chunking call.
    #[must_use]
    pub fn new(file_key: impl Into<String>, max_size: usize) -> Self {
        Self {
            file_key: file_key.into(),
            max_size,
            parent_id: None,
            path: Vec::new(),
            depth: 0,
            id_map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Child context one level deeper, sharing the id map.
    #[must_use]
    pub fn child(&self, parent_id: impl Into<String>, segment: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self {
            file_key: self.file_key.clone(),
            max_size: self.max_size,
            parent_id: Some(parent_id.into()),
            path,
            depth: self.depth + 1,
            id_map: Arc::clone(&self.id_map),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.id_map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chunk id previously assigned to `source_id`, if any.
    #[must_use]
    pub fn lookup(&self, source_id: &str) -> Option<String> {
        self.map().get(source_id).cloned()
    }

    /// Record a source-id → chunk-id assignment.
    pub fn record(&self, source_id: impl Into<String>, chunk_id: impl Into<String>) {
        self.map().insert(source_id.into(), chunk_id.into());
    }
}

// ============================================================================
// Chunker Configuration
// ============================================================================

/// How aggressively the optimizer discards non-essential fields.
///
/// Monotone: every level keeps at most what the previous one kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Deep copy only
    None,
    /// Drop a small deny-list of fields
    Low,
    /// Type-specific compression
    #[default]
    Medium,
    /// Medium, then strip every `_`-prefixed key at any depth
    High,
}

/// Configuration for the chunking orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkerConfig {
    /// Serialized byte budget per chunk
    pub max_chunk_size: usize,
    pub debug: bool,
    pub optimization_level: OptimizationLevel,
    pub collect_metrics: bool,
    pub detect_circular_refs: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 30_720,
            debug: false,
            optimization_level: OptimizationLevel::default(),
            collect_metrics: false,
            detect_circular_refs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(id: &str, file_key: &str, ty: ChunkType) -> Chunk {
        Chunk::new(id.to_string(), file_key.to_string(), ty, json!({"k": "v"}))
    }

    // ==================== ChunkType Tests ====================

    #[test]
    fn test_chunk_type_wire_strings() {
        assert_eq!(ChunkType::Metadata.as_str(), "metadata");
        assert_eq!(ChunkType::Node.as_str(), "node");
        assert_eq!(ChunkType::GlobalVars.as_str(), "globalVars");
    }

    #[test]
    fn test_chunk_type_parse_case_insensitive() {
        assert_eq!("node".parse::<ChunkType>().unwrap(), ChunkType::Node);
        assert_eq!(
            "globalvars".parse::<ChunkType>().unwrap(),
            ChunkType::GlobalVars
        );
        assert_eq!(
            "GLOBALVARS".parse::<ChunkType>().unwrap(),
            ChunkType::GlobalVars
        );
        assert!("frame".parse::<ChunkType>().is_err());
    }

    #[test]
    fn test_chunk_type_serde() {
        assert_eq!(
            serde_json::to_string(&ChunkType::GlobalVars).unwrap(),
            "\"globalVars\""
        );
        let ty: ChunkType = serde_json::from_str("\"metadata\"").unwrap();
        assert_eq!(ty, ChunkType::Metadata);
    }

    // ==================== Chunk Tests ====================

    #[test]
    fn test_chunk_new_timestamps() {
        let c = chunk("f:node:n1", "f", ChunkType::Node);
        assert!(c.last_accessed >= c.created);
        assert!(c.expires.is_none());
        assert!(c.links.is_empty());
    }

    #[test]
    fn test_chunk_wire_format_camel_case() {
        let c = chunk("f:node:n1", "f", ChunkType::Node);
        let v = serde_json::to_value(&c).unwrap();
        assert!(v.get("fileKey").is_some());
        assert!(v.get("lastAccessed").is_some());
        assert_eq!(v["type"], json!("node"));
        // Absent expiry is omitted entirely
        assert!(v.get("expires").is_none());
    }

    #[test]
    fn test_chunk_accepts_missing_expires_and_links() {
        let raw = json!({
            "id": "f:node:n1",
            "fileKey": "f",
            "type": "node",
            "created": "2026-01-01T00:00:00Z",
            "lastAccessed": "2026-01-01T00:00:00Z",
            "data": {}
        });
        let c: Chunk = serde_json::from_value(raw).unwrap();
        assert!(c.expires.is_none());
        assert!(c.links.is_empty());
    }

    #[test]
    fn test_chunk_expiry_default_ttl() {
        let mut c = chunk("f:node:n1", "f", ChunkType::Node);
        let ttl = Duration::milliseconds(100);
        assert!(!c.is_expired(c.created + Duration::milliseconds(50), ttl));
        assert!(c.is_expired(c.created + Duration::milliseconds(150), ttl));

        // Explicit expiry wins over the default
        c.expires = Some(c.created + Duration::seconds(10));
        assert!(!c.is_expired(c.created + Duration::milliseconds(150), ttl));
    }

    #[test]
    fn test_chunk_summary_projection() {
        let c = chunk("f:node:n1", "f", ChunkType::Node);
        let s = c.summary();
        assert_eq!(s.id, c.id);
        assert_eq!(s.chunk_type, ChunkType::Node);
        assert!(s.size > 0);
    }

    // ==================== ChunkFilter Tests ====================

    #[test]
    fn test_filter_defaults() {
        let f = ChunkFilter::default();
        assert_eq!(f.limit, 100);
        assert_eq!(f.sort_by, SortField::Created);
        assert_eq!(f.sort_direction, SortDirection::Desc);
        assert!(!f.include_expired);
    }

    #[test]
    fn test_filter_by_file_key_and_type() {
        let ttl = Duration::days(1);
        let a = chunk("a:node:1", "a", ChunkType::Node);
        let b = chunk("b:metadata:core", "b", ChunkType::Metadata);

        let f = ChunkFilter {
            file_key: Some("a".to_string()),
            ..Default::default()
        };
        let now = Utc::now();
        assert!(f.matches(&a, now, ttl));
        assert!(!f.matches(&b, now, ttl));

        let f = ChunkFilter {
            chunk_type: Some(ChunkType::Metadata),
            ..Default::default()
        };
        assert!(!f.matches(&a, now, ttl));
        assert!(f.matches(&b, now, ttl));
    }

    #[test]
    fn test_filter_excludes_expired_by_default() {
        let ttl = Duration::days(1);
        let mut c = chunk("a:node:1", "a", ChunkType::Node);
        c.expires = Some(Utc::now() - Duration::milliseconds(1));

        let f = ChunkFilter::default();
        assert!(!f.matches(&c, Utc::now(), ttl));

        let f = ChunkFilter {
            include_expired: true,
            ..Default::default()
        };
        assert!(f.matches(&c, Utc::now(), ttl));
    }

    #[test]
    fn test_filter_created_window() {
        let ttl = Duration::days(1);
        let c = chunk("a:node:1", "a", ChunkType::Node);
        let now = Utc::now();

        let f = ChunkFilter {
            older_than: Some(c.created + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(f.matches(&c, now, ttl));

        let f = ChunkFilter {
            newer_than: Some(c.created + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!f.matches(&c, now, ttl));
    }

    #[test]
    fn test_filter_apply_sorts_and_truncates() {
        let ttl = Duration::days(1);
        let mut chunks = Vec::new();
        for i in 0..5 {
            let mut c = chunk(&format!("a:node:{i}"), "a", ChunkType::Node);
            c.created = Utc::now() + Duration::milliseconds(i);
            chunks.push(c);
        }

        let f = ChunkFilter {
            limit: 3,
            sort_by: SortField::Created,
            sort_direction: SortDirection::Desc,
            ..Default::default()
        };
        let out = f.apply(chunks.iter(), ttl);
        assert_eq!(out.len(), 3);
        assert!(out[0].created >= out[1].created);
        assert!(out[1].created >= out[2].created);

        let f = ChunkFilter {
            sort_by: SortField::Id,
            sort_direction: SortDirection::Asc,
            ..Default::default()
        };
        let out = f.apply(chunks.iter(), ttl);
        assert_eq!(out[0].id, "a:node:0");
    }

    // ==================== ChunkResult Tests ====================

    #[test]
    fn test_references_transitive_closure() {
        let mut a = chunk("f:node:a", "f", ChunkType::Node);
        let mut b = chunk("f:node:b", "f", ChunkType::Node);
        let c = chunk("f:node:c", "f", ChunkType::Node);
        b.links = vec!["f:node:c".to_string()];
        a.links = vec!["f:node:b".to_string()];

        let result = ChunkResult::new(vec![a, b, c], "f:node:a".to_string());
        assert_eq!(result.references, vec!["f:node:b", "f:node:c"]);
    }

    #[test]
    fn test_references_exclude_primary_and_unknown_ids() {
        let mut a = chunk("f:node:a", "f", ChunkType::Node);
        // Self-link and a dangling id are both ignored
        a.links = vec![
            "f:node:a".to_string(),
            "f:node:missing".to_string(),
            "f:node:b".to_string(),
        ];
        let b = chunk("f:node:b", "f", ChunkType::Node);

        let result = ChunkResult::new(vec![a, b], "f:node:a".to_string());
        assert_eq!(result.references, vec!["f:node:b"]);
    }

    #[test]
    fn test_references_deduplicated() {
        let mut a = chunk("f:node:a", "f", ChunkType::Node);
        a.links = vec!["f:node:b".to_string(), "f:node:b".to_string()];
        let b = chunk("f:node:b", "f", ChunkType::Node);

        let result = ChunkResult::new(vec![a, b], "f:node:a".to_string());
        assert_eq!(result.references, vec!["f:node:b"]);
    }

    #[test]
    fn test_primary_lookup() {
        let a = chunk("f:node:a", "f", ChunkType::Node);
        let result = ChunkResult::new(vec![a], "f:node:a".to_string());
        assert!(result.primary().is_some());
        assert!(result.references.is_empty());
    }

    // ==================== ChunkContext Tests ====================

    #[test]
    fn test_context_child_shares_id_map() {
        let root = ChunkContext::new("f", 1024);
        let child = root.child("f:node:parent", "Frame 1");

        child.record("src-1", "f:node:abc");
        assert_eq!(root.lookup("src-1").as_deref(), Some("f:node:abc"));
        assert_eq!(child.depth, 1);
        assert_eq!(child.path, vec!["Frame 1"]);
        assert_eq!(child.parent_id.as_deref(), Some("f:node:parent"));
    }

    #[test]
    fn test_context_lookup_miss() {
        let ctx = ChunkContext::new("f", 1024);
        assert!(ctx.lookup("absent").is_none());
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_chunker_config_defaults() {
        let cfg = ChunkerConfig::default();
        assert_eq!(cfg.max_chunk_size, 30_720);
        assert_eq!(cfg.optimization_level, OptimizationLevel::Medium);
        assert!(!cfg.collect_metrics);
        assert!(cfg.detect_circular_refs);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_optimization_level_serde() {
        assert_eq!(
            serde_json::to_string(&OptimizationLevel::High).unwrap(),
            "\"high\""
        );
        let lvl: OptimizationLevel = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(lvl, OptimizationLevel::None);
    }
}
