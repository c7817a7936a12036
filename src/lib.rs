//! Translation between Bluesky-style document streams and plain payloads.
//!
//! Acquisition sessions arrive as ordered `start`, `descriptor`, `event` and
//! `stop` documents. This crate lets ordinary dataflow nodes work on the raw
//! values inside those documents and then wraps the results back into new,
//! well-formed sessions that record which upstream sessions they came from.
//!
//! - [`document`]: the document model
//! - [`stream`]: the single-threaded push graph the nodes live in
//! - [`translation`]: extraction, reconstruction, graph walk and alignment
//! - [`schema`] and [`merge`]: document generation and body merging
//! - [`config`], [`telemetry`], [`error`]: configuration, logging, errors

pub mod config;
pub mod document;
pub mod error;
pub mod merge;
pub mod schema;
pub mod stream;
pub mod telemetry;
pub mod translation;

pub use document::{DocKind, Document};
pub use error::{TranslateError, TranslateResult};
pub use stream::{Graph, Item, NodeId};
