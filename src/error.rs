// error.rs — pipeline error taxonomy
//
// Graph topology mistakes (bad slot, cycle) are hard errors returned at
// `connect` time. Everything that can go wrong *inside* a node's compute
// is not an error at all: it degrades to an empty output buffer and the
// node still clears its dirty flag, so the graph never spins on a
// failing node. File I/O failures are reported to the caller as results.

use crate::graph::NodeId;
use thiserror::Error;

/// Errors raised while mutating graph topology.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The slot index exceeds the node's declared input arity.
    #[error("slot {slot} is out of range for node {node} ({arity} input slots)")]
    InvalidSlot {
        node: NodeId,
        slot: usize,
        arity: usize,
    },

    /// Connecting `src` into `node` would close a directed cycle
    /// (self-edges included). The pipeline is a DAG by construction.
    #[error("connecting {src} into {node} would create a cycle")]
    Cycle { node: NodeId, src: NodeId },

    /// The id does not refer to a node of this graph.
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),
}

/// Errors raised at the graph's file edges (load / save nodes).
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("nothing to save: output buffer is empty")]
    EmptyBuffer,

    #[error("cannot encode a {0}-channel buffer (expected 1 or 3)")]
    UnsupportedChannels(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
