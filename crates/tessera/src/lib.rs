//! Library surface of the tessera binary crate.
//!
//! Exposes the configuration loader and the gateway-facing document
//! service so integration tests (and embedding applications) can drive the
//! same code paths as the CLI.

pub mod config;
pub mod service;

pub use config::Config;
pub use service::{DocumentService, FetchResult, IngestSummary};
