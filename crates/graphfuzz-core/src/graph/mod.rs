//! In-memory graph model shared by the mutator, corpus, and tester harness.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default weight assigned to an edge that does not carry one explicitly.
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

pub type NodeId = u64;

/// The four orthogonal attribute flags a graph carries for its lifetime.
///
/// A mutation never changes these; they are fixed at construction and
/// describe which algorithm families a graph is admissible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAttrs {
    pub directed: bool,
    pub multi_edge: bool,
    pub weighted: bool,
    pub negative_weights: bool,
}

impl GraphAttrs {
    pub const fn simple_undirected() -> Self {
        Self { directed: false, multi_edge: false, weighted: false, negative_weights: false }
    }

    pub const fn simple_directed() -> Self {
        Self { directed: true, multi_edge: false, weighted: false, negative_weights: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
}

impl Edge {
    /// Whether this edge connects the same unordered (or ordered, if
    /// `directed`) pair of nodes as `(from, to)`.
    fn same_pair(&self, from: NodeId, to: NodeId, directed: bool) -> bool {
        if directed {
            self.from == from && self.to == to
        } else {
            (self.from == from && self.to == to) || (self.from == to && self.to == from)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} is not present in the graph")]
    UnknownNode(NodeId),
    #[error("edge ({0}, {1}) already exists and multi-edges are disallowed")]
    DuplicateEdge(NodeId, NodeId),
    #[error("negative edge weight {0} but negative weights are disallowed")]
    NegativeWeightDisallowed(f64),
    #[error("graph contains a negative-weight directed cycle")]
    NegativeCycle,
}

/// A labeled graph: dense-but-not-necessarily-contiguous non-negative
/// integer node ids, and a list of edges (a `Vec` rather than a set, since
/// multi-edge graphs may legitimately hold parallel edges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    attrs: GraphAttrs,
    nodes: BTreeSet<NodeId>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(attrs: GraphAttrs) -> Self {
        Self { attrs, nodes: BTreeSet::new(), edges: Vec::new() }
    }

    /// A single node, no edges — the trivial graph the fuzz loop falls back
    /// to when no seed is available.
    pub fn trivial(attrs: GraphAttrs) -> Self {
        let mut g = Self::new(attrs);
        g.nodes.insert(0);
        g
    }

    pub fn attrs(&self) -> GraphAttrs {
        self.attrs
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Next free node id: one past the current maximum, or 0 if empty.
    pub fn next_node_id(&self) -> NodeId {
        self.nodes.iter().next_back().map(|id| id + 1).unwrap_or(0)
    }

    /// Insert a fresh node using `next_node_id` and return its id.
    pub fn add_node(&mut self) -> NodeId {
        let id = self.next_node_id();
        self.nodes.insert(id);
        id
    }

    /// Insert a node with an explicit id (used when loading seeds).
    pub fn insert_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Remove a node and every edge incident to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        if !self.nodes.remove(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        self.edges.retain(|e| e.from != id && e.to != id);
        Ok(())
    }

    fn has_edge_between(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.iter().any(|e| e.same_pair(from, to, self.attrs.directed))
    }

    /// Whether `from -> to` (or the corresponding unordered pair) already
    /// has an edge.
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.has_edge_between(from, to)
    }

    /// Append an edge, honoring the multi-edge and negative-weight flags.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: f64,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains(&from) {
            return Err(GraphError::UnknownNode(from));
        }
        if !self.nodes.contains(&to) {
            return Err(GraphError::UnknownNode(to));
        }
        if !self.attrs.multi_edge && self.has_edge_between(from, to) {
            return Err(GraphError::DuplicateEdge(from, to));
        }
        if !self.attrs.negative_weights && weight < 0.0 {
            return Err(GraphError::NegativeWeightDisallowed(weight));
        }
        self.edges.push(Edge { from, to, weight });
        Ok(())
    }

    /// Remove the edge at `index`. No-op signalled via `Ok(false)` when the
    /// graph is edgeless; the mutator relies on this rather than erroring.
    pub fn remove_edge_at(&mut self, index: usize) -> bool {
        if index >= self.edges.len() {
            return false;
        }
        self.edges.remove(index);
        true
    }

    /// True if any stored edge carries a negative weight.
    pub fn has_negative_weight(&self) -> bool {
        self.edges.iter().any(|e| e.weight < 0.0)
    }

    /// Validate the structural invariants §3 of the spec requires. Multi-edge
    /// and negative-weight checks are always enforced by construction
    /// (`add_edge` rejects violating inserts), so this mostly matters after
    /// deserializing a corpus record from disk.
    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.attrs.multi_edge {
            for (i, a) in self.edges.iter().enumerate() {
                for b in &self.edges[i + 1..] {
                    if a.same_pair(b.from, b.to, self.attrs.directed) {
                        return Err(GraphError::DuplicateEdge(a.from, a.to));
                    }
                }
            }
        }
        if !self.attrs.negative_weights {
            if let Some(e) = self.edges.iter().find(|e| e.weight < 0.0) {
                return Err(GraphError::NegativeWeightDisallowed(e.weight));
            }
        }
        Ok(())
    }

    /// Bellman-Ford over the directed edge list, used by testers (and
    /// available to seed generators) that need the "no negative cycle"
    /// invariant enforced rather than merely allowed.
    pub fn has_negative_cycle(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut dist: std::collections::HashMap<NodeId, f64> =
            self.nodes.iter().map(|&n| (n, 0.0)).collect();
        let directed_edges: Vec<(NodeId, NodeId, f64)> = if self.attrs.directed {
            self.edges.iter().map(|e| (e.from, e.to, e.weight)).collect()
        } else {
            self.edges
                .iter()
                .flat_map(|e| [(e.from, e.to, e.weight), (e.to, e.from, e.weight)])
                .collect()
        };
        for _ in 0..self.nodes.len() {
            let mut relaxed = false;
            for &(u, v, w) in &directed_edges {
                let du = dist[&u];
                if du + w < dist[&v] {
                    dist.insert(v, du + w);
                    relaxed = true;
                }
            }
            if !relaxed {
                return false;
            }
        }
        directed_edges.iter().any(|&(u, v, w)| dist[&u] + w < dist[&v])
    }

    pub fn check_no_negative_cycle(&self) -> Result<(), GraphError> {
        if self.has_negative_cycle() {
            Err(GraphError::NegativeCycle)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_graph_has_one_node_no_edges() {
        let g = Graph::trivial(GraphAttrs::simple_directed());
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn next_node_id_fills_gap_from_max_not_from_deletion() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        g.add_node();
        g.add_node();
        let third = g.add_node();
        assert_eq!(third, 2);
        g.remove_node(0).unwrap();
        // Deleting a low id doesn't change the next-id policy: it's always
        // one past the current maximum.
        assert_eq!(g.next_node_id(), 3);
    }

    #[test]
    fn multi_edge_disallowed_rejects_duplicate() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        g.add_node();
        g.add_node();
        g.add_edge(0, 1, 1.0).unwrap();
        assert_eq!(g.add_edge(0, 1, 1.0), Err(GraphError::DuplicateEdge(0, 1)));
    }

    #[test]
    fn undirected_duplicate_detected_either_order() {
        let mut g = Graph::new(GraphAttrs::simple_undirected());
        g.add_node();
        g.add_node();
        g.add_edge(0, 1, 1.0).unwrap();
        assert_eq!(g.add_edge(1, 0, 1.0), Err(GraphError::DuplicateEdge(1, 0)));
    }

    #[test]
    fn negative_weight_rejected_when_disallowed() {
        let mut g = Graph::new(GraphAttrs {
            directed: true,
            multi_edge: false,
            weighted: true,
            negative_weights: false,
        });
        g.add_node();
        g.add_node();
        assert_eq!(g.add_edge(0, 1, -1.0), Err(GraphError::NegativeWeightDisallowed(-1.0)));
    }

    #[test]
    fn remove_edge_at_out_of_range_is_noop() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        assert!(!g.remove_edge_at(0));
    }

    #[test]
    fn negative_cycle_detected() {
        let mut g = Graph::new(GraphAttrs {
            directed: true,
            multi_edge: false,
            weighted: true,
            negative_weights: true,
        });
        g.add_node();
        g.add_node();
        g.add_node();
        g.add_edge(0, 1, 1.0).unwrap();
        g.add_edge(1, 2, -3.0).unwrap();
        g.add_edge(2, 0, 1.0).unwrap();
        assert!(g.has_negative_cycle());
        assert_eq!(g.check_no_negative_cycle(), Err(GraphError::NegativeCycle));
    }

    #[test]
    fn no_negative_cycle_on_acyclic_negative_edge() {
        let mut g = Graph::new(GraphAttrs {
            directed: true,
            multi_edge: false,
            weighted: true,
            negative_weights: true,
        });
        g.add_node();
        g.add_node();
        g.add_node();
        g.add_edge(0, 1, 2.0).unwrap();
        g.add_edge(1, 2, -1.0).unwrap();
        g.add_edge(0, 2, 4.0).unwrap();
        assert!(!g.has_negative_cycle());
    }
}
