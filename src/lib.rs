//! Node-based image processing pipeline.
//!
//! Images flow through a directed acyclic graph of processing nodes.
//! Each node caches its last output behind a dirty flag: editing a
//! parameter or rewiring an edge invalidates only the node's downstream
//! cone, and [`PipelineGraph::evaluate_all`] recomputes exactly the
//! stale nodes in topological order. The [`noise`] module supplies
//! deterministic Perlin, simplex and Worley fields that nodes can add
//! to, displace, or colorize an image with.
//!
//! ```no_run
//! use rastergraph::{io, NodeKind, OutputFormat, PipelineGraph};
//! use rastergraph::nodes::LoadImageParams;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = PipelineGraph::new();
//! let src = graph.register(
//!     "photo",
//!     NodeKind::LoadImage(LoadImageParams::with_image(io::load("photo.png")?)),
//! );
//! let tone = graph.register(
//!     "tone",
//!     NodeKind::BrightnessContrast { brightness: 12.0, contrast: 1.1 },
//! );
//! graph.connect(tone, 0, Some(src))?;
//! graph.evaluate_all();
//! io::save("out.png", &*graph.output(tone)?, OutputFormat::default())?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod error;
pub mod graph;
pub mod io;
pub mod nodes;
pub mod noise;
pub mod ops;

pub use buffer::ImageBuffer;
pub use error::{GraphError, IoError};
pub use graph::{GraphSpec, NodeId, PipelineGraph};
pub use nodes::{NodeKind, OutputFormat};
pub use noise::{NoiseAlgorithm, NoiseSynth};
