//! Translation nodes between document streams and payload dataflow.
//!
//! - [`ExtractNode`]: peels payloads out of documents and relays session
//!   start/stop to the nodes that depend on it
//! - [`ReconstructNode`]: wraps payloads back into a new session
//! - [`walk`]: discovers which translation nodes feed a reconstruction node
//! - [`AlignNode`]: merges several document streams in lock-step
//!
//! # Example
//!
//! ```rust
//! use daq_translation::document::DocKind;
//! use daq_translation::stream::{Graph, Map, Sink, Source};
//! use daq_translation::translation::{Address, ExtractOptions, ReconstructOptions};
//!
//! # fn main() -> daq_translation::error::TranslateResult<()> {
//! let mut graph = Graph::new();
//! let raw = graph.add_node(Source::new("raw"), &[])?;
//! let img = graph.add_extraction(
//!     raw,
//!     ExtractOptions::new(DocKind::Event, Address::path(["data", "img"])).principal(),
//! )?;
//! let processed = graph.add_node(Map::new("identity", |v| v), &[img])?;
//! let recon = graph.add_reconstruction(processed, ReconstructOptions::keys(["img"]))?;
//! let (sink, out) = Sink::new("out");
//! graph.add_node(sink, &[recon])?;
//! # assert!(out.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod extract;
pub mod reconstruct;
pub mod walk;

pub use align::{AlignNode, AlignPolicy, AlignSource};
pub use extract::{Address, AddressPart, ExtractNode, ExtractOptions, StreamFilter};
pub use reconstruct::{ReconstructNode, ReconstructOptions, SessionState};
pub use walk::{boundary_nodes, principal_nodes, walk_to_translation, DependencyGraph};
