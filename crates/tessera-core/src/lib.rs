//! # tessera-core
//!
//! Core types and traits for tessera, a content-aware chunking and caching
//! layer for large hierarchical design documents.
//!
//! This crate provides the foundational abstractions used throughout tessera:
//!
//! - **Chunk model**: [`Chunk`], the smallest independently addressable unit
//!   of persisted design data, plus [`ChunkSummary`], [`ChunkFilter`] and
//!   [`ChunkResult`]
//! - **Chunk identifiers**: the `fileKey:type:identifier` wire format
//!   ([`id`])
//! - **Size estimation**: serialized-size estimation and split predicates
//!   ([`estimate`])
//! - **Chunking strategies**: the [`ChunkStrategy`] trait implemented once
//!   per [`ChunkType`]
//! - **Persistence**: the [`StorageAdapter`] trait implemented by every
//!   storage backend
//!
//! ## Architecture
//!
//! ```text
//! Document → Chunker → ChunkStrategy → ChunkResult → StorageAdapter
//!                                            ↓
//!                                    ChunkFilter → ChunkSummary
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | A persisted slice of a design document |
//! | [`ChunkType`] | Tagged variant: metadata, node or globalVars |
//! | [`ChunkResult`] | Output of one chunking invocation |
//! | [`ChunkContext`] | Per-operation state propagated through a strategy |
//! | [`ChunkerConfig`] | Budget and post-processing knobs |
//!
//! ## Related Crates
//!
//! - `tessera-chunker`: strategy implementations, optimizer, reference graph
//! - `tessera-store`: memory / filesystem / Redis / MongoDB adapters
//! - `tessera`: CLI and the gateway-facing document service

pub mod error;
pub mod estimate;
pub mod id;
pub mod traits;
pub mod types;

pub use error::{ChunkError, Error, Result, StoreError};
pub use traits::*;
pub use types::*;
