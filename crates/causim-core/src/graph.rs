//! Graph compiler: turns a declarative [`Model`] into lookup tables for
//! repeated per-step traversal.
//!
//! Compilation is pure and linear in nodes + edges. Every node gets an
//! entry in both adjacency maps (possibly empty) so callers never have to
//! special-case a missing key. All maps preserve model order, which is
//! the tie-break rule for breach reporting.

use causim_types::{Model, Node, NodeId};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// One incoming influence on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEdge {
    /// The node the influence comes from.
    pub source: NodeId,
    /// Edge weight.
    pub weight: f64,
    /// `1.0` for `+`, `-1.0` for `-`.
    pub sign: f64,
}

/// A model compiled for stepping.
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    /// Integrated nodes, in model order.
    regular: IndexMap<NodeId, Node>,
    /// Pulse-source nodes, in model order.
    events: IndexMap<NodeId, Node>,
    /// Node id -> incoming edges.
    incoming: IndexMap<NodeId, Vec<IncomingEdge>>,
    /// Node id -> outgoing target ids.
    outgoing: IndexMap<NodeId, Vec<NodeId>>,
    /// Every node id, in model order.
    order: Vec<NodeId>,
}

impl CompiledGraph {
    /// Compile `model`.
    ///
    /// Self-loops and parallel edges are kept and each contributes on its
    /// own. Edges referencing unknown nodes should have been rejected by
    /// the schema layer; if one slips through it is skipped.
    pub fn compile(model: &Model) -> Self {
        let mut graph = Self::default();

        for node in &model.nodes {
            graph.order.push(node.id.clone());
            graph.incoming.insert(node.id.clone(), Vec::new());
            graph.outgoing.insert(node.id.clone(), Vec::new());
            if node.is_event() {
                graph.events.insert(node.id.clone(), node.clone());
            } else {
                graph.regular.insert(node.id.clone(), node.clone());
            }
        }

        for edge in &model.edges {
            if !graph.incoming.contains_key(&edge.to) || !graph.outgoing.contains_key(&edge.from) {
                warn!(
                    edge = %edge.id,
                    from = %edge.from,
                    to = %edge.to,
                    "edge references unknown node, skipped"
                );
                continue;
            }
            if let Some(list) = graph.incoming.get_mut(&edge.to) {
                list.push(IncomingEdge {
                    source: edge.from.clone(),
                    weight: edge.weight,
                    sign: edge.polarity.sign(),
                });
            }
            if let Some(list) = graph.outgoing.get_mut(&edge.from) {
                list.push(edge.to.clone());
            }
        }

        debug!(
            regular = graph.regular.len(),
            events = graph.events.len(),
            edges = model.edges.len(),
            "graph compiled"
        );
        graph
    }

    /// Integrated nodes, in model order.
    pub const fn regular(&self) -> &IndexMap<NodeId, Node> {
        &self.regular
    }

    /// Pulse-source nodes, in model order.
    pub const fn events(&self) -> &IndexMap<NodeId, Node> {
        &self.events
    }

    /// Look up any node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.regular.get(id).or_else(|| self.events.get(id))
    }

    /// Whether `id` names an event node.
    pub fn is_event(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    /// Incoming edges of `id`; empty for unknown ids.
    pub fn incoming(&self, id: &str) -> &[IncomingEdge] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Outgoing target ids of `id`; empty for unknown ids.
    pub fn outgoing(&self, id: &str) -> &[NodeId] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of nodes of either kind.
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// The model's initial values, in model order.
    pub fn initial_values(&self) -> IndexMap<NodeId, f64> {
        self.order
            .iter()
            .filter_map(|id| self.node(id.as_str()).map(|node| (id.clone(), node.value)))
            .collect()
    }
}
