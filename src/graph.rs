// graph.rs — the dataflow graph: registry, edges, dirty flags, evaluation
//
// The graph owns everything: node parameters, input edges, the dirty
// flag, and the cached output of every node. Edges point upstream (each
// node stores which node feeds each of its input slots); downstream
// traversal is derived by scanning. The cache invariant is simple and
// strict: a node's cached buffer reflects its current parameters and
// inputs if and only if its dirty flag is clear.
//
// Cycles are rejected at connect time, so evaluation can always find a
// topological order and never needs a recursion guard.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::buffer::ImageBuffer;
use crate::error::GraphError;
use crate::nodes::NodeKind;

/// Stable handle to a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct NodeEntry {
    name: String,
    kind: NodeKind,
    /// One upstream source per input slot; `None` means unconnected.
    inputs: SmallVec<[Option<NodeId>; 2]>,
    dirty: bool,
    cache: Arc<ImageBuffer>,
}

/// A directed acyclic pipeline of image-processing nodes with cached,
/// dirty-flag-tracked outputs.
#[derive(Default)]
pub struct PipelineGraph {
    nodes: Vec<NodeEntry>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a node. New nodes start dirty with an empty cache and
    /// all input slots unconnected.
    pub fn register(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let arity = kind.input_count();
        self.nodes.push(NodeEntry {
            name: name.into(),
            kind,
            inputs: SmallVec::from_elem(None, arity),
            dirty: true,
            cache: Arc::new(ImageBuffer::empty()),
        });
        debug!(node = %id, label = self.nodes[id.index()].kind.label(), "registered node");
        id
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry, GraphError> {
        self.nodes.get(id.index()).ok_or(GraphError::UnknownNode(id))
    }

    /// True if `target` is reachable from `from` by following edges
    /// downstream.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        if from == target {
            return true;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        seen[from.index()] = true;
        while let Some(current) = stack.pop() {
            for (i, entry) in self.nodes.iter().enumerate() {
                if entry.inputs.iter().flatten().any(|&src| src == current) && !seen[i] {
                    if i == target.index() {
                        return true;
                    }
                    seen[i] = true;
                    stack.push(NodeId(i as u32));
                }
            }
        }
        false
    }

    /// Connect `source`'s output into `node`'s input `slot`, or
    /// disconnect the slot with `None`. Rejects out-of-range slots and
    /// any edge that would close a cycle, leaving the graph unchanged.
    /// A successful change invalidates `node` and everything downstream.
    pub fn connect(
        &mut self,
        node: NodeId,
        slot: usize,
        source: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let arity = self.entry(node)?.inputs.len();
        if slot >= arity {
            return Err(GraphError::InvalidSlot { node, slot, arity });
        }
        if let Some(source) = source {
            self.entry(source)?;
            // A source reachable from `node` would close a loop
            if self.reaches(node, source) {
                return Err(GraphError::Cycle { node, src: source });
            }
        }
        if self.nodes[node.index()].inputs[slot] == source {
            return Ok(());
        }
        self.nodes[node.index()].inputs[slot] = source;
        debug!(node = %node, slot, source = ?source, "edge changed");
        self.invalidate(node);
        Ok(())
    }

    /// Replace a node's kind (parameters included). Setting a value
    /// equal to the current one is a no-op that preserves the cache;
    /// any real change invalidates the node and its downstream cone.
    /// Returns whether anything changed.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<bool, GraphError> {
        self.entry(id)?;
        if self.nodes[id.index()].kind == kind {
            return Ok(false);
        }
        let arity = kind.input_count();
        let entry = &mut self.nodes[id.index()];
        entry.kind = kind;
        entry.inputs.resize(arity, None);
        self.invalidate(id);
        Ok(true)
    }

    /// Mark `id` and every transitively downstream node dirty. Nodes
    /// outside the downstream cone keep their caches.
    pub fn invalidate(&mut self, id: NodeId) {
        if id.index() >= self.nodes.len() {
            return;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        seen[id.index()] = true;
        while let Some(current) = stack.pop() {
            self.nodes[current.index()].dirty = true;
            for (i, entry) in self.nodes.iter().enumerate() {
                if !seen[i] && entry.inputs.iter().flatten().any(|&src| src == current) {
                    seen[i] = true;
                    stack.push(NodeId(i as u32));
                }
            }
        }
    }

    /// Kahn's algorithm over the current edge set. Total order exists
    /// because `connect` rejects cycles.
    fn topological_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, entry) in self.nodes.iter().enumerate() {
            for src in entry.inputs.iter().flatten() {
                indegree[i] += 1;
                downstream[src.index()].push(i);
            }
        }
        let mut queue: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop() {
            order.push(NodeId(i as u32));
            for &d in &downstream[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    queue.push(d);
                }
            }
        }
        debug_assert_eq!(order.len(), n, "graph must be acyclic");
        order
    }

    /// Recompute every stale node, upstream before downstream. A node
    /// runs when its own flag is dirty or any direct input was refreshed
    /// earlier in the same pass; afterwards every flag is clear. Clean
    /// subgraphs are skipped entirely.
    pub fn evaluate_all(&mut self) {
        let order = self.topological_order();
        let mut refreshed = vec![false; self.nodes.len()];

        for id in order {
            let i = id.index();
            let needs = self.nodes[i].dirty
                || self.nodes[i]
                    .inputs
                    .iter()
                    .flatten()
                    .any(|src| refreshed[src.index()]);
            if !needs {
                continue;
            }

            let inputs: Vec<Arc<ImageBuffer>> = self.nodes[i]
                .inputs
                .iter()
                .map(|slot| match slot {
                    Some(src) => Arc::clone(&self.nodes[src.index()].cache),
                    None => Arc::new(ImageBuffer::empty()),
                })
                .collect();

            let output = self.nodes[i].kind.process(&inputs);
            debug!(
                node = %id,
                label = self.nodes[i].kind.label(),
                width = output.width(),
                height = output.height(),
                "recomputed"
            );
            self.nodes[i].cache = Arc::new(output);
            self.nodes[i].dirty = false;
            refreshed[i] = true;
        }
    }

    /// The node's cached output buffer. Call [`evaluate_all`] first if
    /// the node may be dirty.
    ///
    /// [`evaluate_all`]: PipelineGraph::evaluate_all
    pub fn output(&self, id: NodeId) -> Result<Arc<ImageBuffer>, GraphError> {
        Ok(Arc::clone(&self.entry(id)?.cache))
    }

    pub fn is_dirty(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.entry(id)?.dirty)
    }

    pub fn name(&self, id: NodeId) -> Result<&str, GraphError> {
        Ok(&self.entry(id)?.name)
    }

    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, GraphError> {
        Ok(&self.entry(id)?.kind)
    }

    pub fn input_count(&self, id: NodeId) -> Result<usize, GraphError> {
        Ok(self.entry(id)?.inputs.len())
    }

    /// The source currently connected to `slot`, if any.
    pub fn input(&self, id: NodeId, slot: usize) -> Result<Option<NodeId>, GraphError> {
        let entry = self.entry(id)?;
        entry
            .inputs
            .get(slot)
            .copied()
            .ok_or(GraphError::InvalidSlot {
                node: id,
                slot,
                arity: entry.inputs.len(),
            })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Snapshot the graph structure (names, kinds, edges) as a
    /// serializable document. Caches and dirty flags are not part of
    /// the document.
    pub fn to_spec(&self) -> GraphSpec {
        let nodes = self
            .nodes
            .iter()
            .map(|entry| NodeSpec {
                name: entry.name.clone(),
                kind: entry.kind.clone(),
            })
            .collect();
        let mut edges = Vec::new();
        for (i, entry) in self.nodes.iter().enumerate() {
            for (slot, src) in entry.inputs.iter().enumerate() {
                if let Some(src) = src {
                    edges.push(EdgeSpec {
                        source: *src,
                        target: NodeId(i as u32),
                        slot,
                    });
                }
            }
        }
        GraphSpec { nodes, edges }
    }

    /// Rebuild a graph from a document. Edges go through [`connect`],
    /// so a tampered document with bad slots or cycles is rejected.
    /// All nodes start dirty.
    ///
    /// [`connect`]: PipelineGraph::connect
    pub fn from_spec(spec: GraphSpec) -> Result<Self, GraphError> {
        let mut graph = PipelineGraph::new();
        for node in spec.nodes {
            graph.register(node.name, node.kind);
        }
        for edge in spec.edges {
            graph.connect(edge.target, edge.slot, Some(edge.source))?;
        }
        Ok(graph)
    }
}

/// Serializable graph structure: the node list plus the edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: NodeId,
    pub target: NodeId,
    pub slot: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ConvolveParams, LoadImageParams};
    use crate::ops::BlendMode;

    fn checker(width: u32, height: u32) -> ImageBuffer {
        let mut buf = ImageBuffer::new(width, height, 3);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 40 } else { 215 };
                buf.pixel_mut(x, y).copy_from_slice(&[v, v, v]);
            }
        }
        buf
    }

    fn load_node(graph: &mut PipelineGraph) -> NodeId {
        graph.register(
            "source",
            NodeKind::LoadImage(LoadImageParams::with_image(checker(8, 8))),
        )
    }

    fn chain(graph: &mut PipelineGraph) -> (NodeId, NodeId, NodeId) {
        let a = load_node(graph);
        let b = graph.register(
            "tone",
            NodeKind::BrightnessContrast {
                brightness: 10.0,
                contrast: 1.0,
            },
        );
        let c = graph.register("filter", NodeKind::Convolve(ConvolveParams::identity()));
        graph.connect(b, 0, Some(a)).unwrap();
        graph.connect(c, 0, Some(b)).unwrap();
        (a, b, c)
    }

    #[test]
    fn new_nodes_start_dirty_with_empty_cache() {
        let mut graph = PipelineGraph::new();
        let id = load_node(&mut graph);
        assert!(graph.is_dirty(id).unwrap());
        assert!(graph.output(id).unwrap().is_empty());
    }

    #[test]
    fn evaluate_clears_all_flags() {
        let mut graph = PipelineGraph::new();
        let (a, b, c) = chain(&mut graph);
        graph.evaluate_all();
        for id in [a, b, c] {
            assert!(!graph.is_dirty(id).unwrap());
        }
        assert!(!graph.output(c).unwrap().is_empty());
    }

    #[test]
    fn invalidation_reaches_only_downstream() {
        let mut graph = PipelineGraph::new();
        let (a, b, c) = chain(&mut graph);
        // Independent branch off the same source
        let d = graph.register("side", NodeKind::Convolve(ConvolveParams::identity()));
        graph.connect(d, 0, Some(a)).unwrap();
        graph.evaluate_all();

        graph.invalidate(b);
        assert!(!graph.is_dirty(a).unwrap(), "upstream must stay clean");
        assert!(graph.is_dirty(b).unwrap());
        assert!(graph.is_dirty(c).unwrap());
        assert!(!graph.is_dirty(d).unwrap(), "sibling branch must stay clean");
    }

    #[test]
    fn evaluate_is_idempotent() {
        let mut graph = PipelineGraph::new();
        let (_, _, c) = chain(&mut graph);
        graph.evaluate_all();
        let first = graph.output(c).unwrap();
        graph.evaluate_all();
        let second = graph.output(c).unwrap();
        // Clean pass must not recompute; the Arc is untouched
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn parameter_edit_recomputes_downstream_cone() {
        let mut graph = PipelineGraph::new();
        let (_, b, c) = chain(&mut graph);
        graph.evaluate_all();
        let before = graph.output(c).unwrap();

        let changed = graph
            .set_kind(
                b,
                NodeKind::BrightnessContrast {
                    brightness: 60.0,
                    contrast: 1.0,
                },
            )
            .unwrap();
        assert!(changed);
        assert!(graph.is_dirty(c).unwrap());
        graph.evaluate_all();
        let after = graph.output(c).unwrap();
        assert_ne!(before.as_ref(), after.as_ref());
    }

    #[test]
    fn setting_identical_kind_is_noop() {
        let mut graph = PipelineGraph::new();
        let (_, b, c) = chain(&mut graph);
        graph.evaluate_all();
        let kind = graph.kind(b).unwrap().clone();
        let changed = graph.set_kind(b, kind).unwrap();
        assert!(!changed);
        assert!(!graph.is_dirty(b).unwrap());
        assert!(!graph.is_dirty(c).unwrap());
    }

    #[test]
    fn registration_order_does_not_constrain_evaluation() {
        // Register downstream-first: evaluation must still run the
        // source before its consumer
        let mut graph = PipelineGraph::new();
        let filter = graph.register("filter", NodeKind::Convolve(ConvolveParams::identity()));
        let source = graph.register(
            "source",
            NodeKind::LoadImage(LoadImageParams::with_image(checker(4, 4))),
        );
        graph.connect(filter, 0, Some(source)).unwrap();
        graph.evaluate_all();
        assert_eq!(graph.output(filter).unwrap().as_ref(), &checker(4, 4));
    }

    #[test]
    fn diamond_evaluates_each_node_once() {
        let mut graph = PipelineGraph::new();
        let src = load_node(&mut graph);
        let left = graph.register("left", NodeKind::Convolve(ConvolveParams::identity()));
        let right = graph.register(
            "right",
            NodeKind::BrightnessContrast {
                brightness: 0.0,
                contrast: 1.0,
            },
        );
        let join = graph.register(
            "join",
            NodeKind::Blend {
                mode: BlendMode::Difference,
            },
        );
        graph.connect(left, 0, Some(src)).unwrap();
        graph.connect(right, 0, Some(src)).unwrap();
        graph.connect(join, 0, Some(left)).unwrap();
        graph.connect(join, 1, Some(right)).unwrap();

        graph.evaluate_all();
        // Identical branches: difference blend is black
        let out = graph.output(join).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));
        for id in graph.node_ids().collect::<Vec<_>>() {
            assert!(!graph.is_dirty(id).unwrap());
        }
    }

    #[test]
    fn connect_rejects_out_of_range_slot() {
        let mut graph = PipelineGraph::new();
        let a = load_node(&mut graph);
        let b = graph.register("filter", NodeKind::Convolve(ConvolveParams::identity()));
        let err = graph.connect(b, 1, Some(a)).unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidSlot {
                node: b,
                slot: 1,
                arity: 1
            }
        );
    }

    #[test]
    fn connect_rejects_self_edge_and_cycles() {
        let mut graph = PipelineGraph::new();
        let a = graph.register("a", NodeKind::Convolve(ConvolveParams::identity()));
        let b = graph.register("b", NodeKind::Convolve(ConvolveParams::identity()));
        assert_eq!(
            graph.connect(a, 0, Some(a)).unwrap_err(),
            GraphError::Cycle { node: a, src: a }
        );
        graph.connect(b, 0, Some(a)).unwrap();
        assert_eq!(
            graph.connect(a, 0, Some(b)).unwrap_err(),
            GraphError::Cycle { node: a, src: b }
        );
        // Failed connect leaves the edge set unchanged
        assert_eq!(graph.input(a, 0).unwrap(), None);
    }

    #[test]
    fn connect_unknown_ids_rejected() {
        let mut graph = PipelineGraph::new();
        let a = load_node(&mut graph);
        let ghost = NodeId(99);
        assert_eq!(
            graph.connect(ghost, 0, Some(a)).unwrap_err(),
            GraphError::UnknownNode(ghost)
        );
        let b = graph.register("filter", NodeKind::Convolve(ConvolveParams::identity()));
        assert_eq!(
            graph.connect(b, 0, Some(ghost)).unwrap_err(),
            GraphError::UnknownNode(ghost)
        );
    }

    #[test]
    fn disconnect_invalidates_consumer() {
        let mut graph = PipelineGraph::new();
        let (_, b, c) = chain(&mut graph);
        graph.evaluate_all();
        graph.connect(b, 0, None).unwrap();
        assert!(graph.is_dirty(b).unwrap());
        assert!(graph.is_dirty(c).unwrap());
        graph.evaluate_all();
        // No source: the chain degrades to empty buffers
        assert!(graph.output(c).unwrap().is_empty());
    }

    #[test]
    fn reconnecting_same_source_is_noop() {
        let mut graph = PipelineGraph::new();
        let (a, b, _) = chain(&mut graph);
        graph.evaluate_all();
        graph.connect(b, 0, Some(a)).unwrap();
        assert!(!graph.is_dirty(b).unwrap());
    }

    #[test]
    fn unconnected_input_is_empty_buffer() {
        let mut graph = PipelineGraph::new();
        let filter = graph.register("filter", NodeKind::Convolve(ConvolveParams::identity()));
        graph.evaluate_all();
        assert!(graph.output(filter).unwrap().is_empty());
        assert!(!graph.is_dirty(filter).unwrap(), "dirty flag clears even on empty output");
    }

    #[test]
    fn spec_round_trip_preserves_structure() {
        let mut graph = PipelineGraph::new();
        let (a, b, c) = chain(&mut graph);
        graph.evaluate_all();
        let expected = graph.output(c).unwrap();

        let json = serde_json::to_string(&graph.to_spec()).unwrap();
        let spec: GraphSpec = serde_json::from_str(&json).unwrap();
        let mut restored = PipelineGraph::from_spec(spec).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.input(b, 0).unwrap(), Some(a));
        assert!(restored.is_dirty(c).unwrap(), "restored nodes start dirty");

        // Decoded pixels are not part of the document; reload the source
        restored
            .set_kind(
                a,
                NodeKind::LoadImage(LoadImageParams::with_image(checker(8, 8))),
            )
            .unwrap();
        restored.evaluate_all();
        assert_eq!(restored.output(c).unwrap().as_ref(), expected.as_ref());
    }

    #[test]
    fn from_spec_rejects_cyclic_document() {
        let mut graph = PipelineGraph::new();
        let a = graph.register("a", NodeKind::Convolve(ConvolveParams::identity()));
        let b = graph.register("b", NodeKind::Convolve(ConvolveParams::identity()));
        graph.connect(b, 0, Some(a)).unwrap();
        let mut spec = graph.to_spec();
        spec.edges.push(EdgeSpec {
            source: b,
            target: a,
            slot: 0,
        });
        assert!(matches!(
            PipelineGraph::from_spec(spec),
            Err(GraphError::Cycle { .. })
        ));
    }
}
