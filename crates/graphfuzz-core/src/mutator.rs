//! One-random-local-edit mutator. Mirrors the shape of the teacher's
//! `SeedMutator` (`fuzz/mutators.rs`): a handful of named edit strategies,
//! dispatched on a single `rand.below(nz(n))` roll, each implemented as a
//! free function taking `&mut Graph` plus the shared RNG.

use std::num::NonZeroUsize;

use libafl_bolts::rands::Rand;

use crate::graph::{Graph, GraphAttrs, NodeId};

const MAX_EDGE_RESAMPLE_ATTEMPTS: usize = 100;
const MIN_EDGE_WEIGHT: i64 = 1;
const MAX_EDGE_WEIGHT: i64 = 500;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap()
}

/// Applies exactly one of the four edits to `g`, returning a new graph.
/// `g` itself is never mutated in place, matching the corpus invariant that
/// inserted graphs are immutable once appended.
pub fn mutate<R: Rand>(g: &Graph, rand: &mut R) -> Graph {
    let mut out = g.clone();
    match rand.below(nz(4)) {
        0 => add_node(&mut out),
        1 => delete_node(&mut out, rand),
        2 => add_edge(&mut out, rand),
        _ => delete_edge(&mut out, rand),
    }
    out
}

fn add_node(g: &mut Graph) {
    g.add_node();
}

fn delete_node<R: Rand>(g: &mut Graph, rand: &mut R) {
    let ids: Vec<NodeId> = g.node_ids().collect();
    if ids.is_empty() {
        return;
    }
    let idx = rand.below(nz(ids.len()));
    g.remove_node(ids[idx]).expect("sampled id came from the graph's own node set");
}

fn add_edge<R: Rand>(g: &mut Graph, rand: &mut R) {
    let ids: Vec<NodeId> = g.node_ids().collect();
    if ids.len() < 2 {
        return;
    }

    let mut from = ids[rand.below(nz(ids.len()))];
    let mut to = ids[rand.below(nz(ids.len()))];
    if !g.attrs().multi_edge {
        let mut attempts = 0;
        while (from == to || g.has_edge(from, to)) && attempts < MAX_EDGE_RESAMPLE_ATTEMPTS {
            from = ids[rand.below(nz(ids.len()))];
            to = ids[rand.below(nz(ids.len()))];
            attempts += 1;
        }
        if from == to || g.has_edge(from, to) {
            // Still colliding after the resample budget: attach to a fresh node instead.
            let fresh = g.add_node();
            to = fresh;
        }
    } else if from == to {
        // Self-loops are fine for multigraphs, but keep the original sample
        // as-is; nothing further to resolve.
    }

    let weight = weight_for(g.attrs(), g, rand);
    let _ = g.add_edge(from, to, weight);
}

fn weight_for<R: Rand>(attrs: GraphAttrs, g: &Graph, rand: &mut R) -> f64 {
    if !attrs.weighted {
        return crate::graph::DEFAULT_EDGE_WEIGHT;
    }
    let span = (MAX_EDGE_WEIGHT - MIN_EDGE_WEIGHT + 1) as usize;
    let magnitude = MIN_EDGE_WEIGHT + rand.below(nz(span)) as i64;
    let mut weight = magnitude as f64;
    if attrs.negative_weights && g.has_negative_weight() && rand.below(nz(2)) == 0 {
        weight = -weight;
    }
    weight
}

fn delete_edge<R: Rand>(g: &mut Graph, rand: &mut R) {
    if g.edge_count() == 0 {
        return;
    }
    let idx = rand.below(nz(g.edge_count()));
    g.remove_edge_at(idx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use libafl_bolts::rands::StdRand;

    fn rand() -> StdRand {
        StdRand::with_seed(7)
    }

    #[test]
    fn mutation_preserves_attribute_flags() {
        let attrs = GraphAttrs { directed: true, multi_edge: false, weighted: true, negative_weights: true };
        let mut g = Graph::new(attrs);
        g.add_node();
        g.add_node();
        let mut r = rand();
        for _ in 0..200 {
            g = mutate(&g, &mut r);
            assert_eq!(g.attrs(), attrs);
        }
    }

    #[test]
    fn add_node_increases_node_count_by_one() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        let before = g.node_count();
        add_node(&mut g);
        assert_eq!(g.node_count(), before + 1);
    }

    #[test]
    fn delete_edge_on_edgeless_graph_is_noop() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        g.add_node();
        let before = g.edge_count();
        let mut r = rand();
        delete_edge(&mut g, &mut r);
        assert_eq!(g.edge_count(), before);
    }

    #[test]
    fn delete_edge_removes_exactly_one() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        g.add_node();
        g.add_node();
        g.add_edge(0, 1, 1.0).unwrap();
        g.add_edge(1, 0, 1.0).unwrap();
        let before = g.edge_count();
        let mut r = rand();
        delete_edge(&mut g, &mut r);
        assert_eq!(g.edge_count(), before - 1);
    }

    #[test]
    fn delete_node_on_empty_graph_is_noop() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        let mut r = rand();
        delete_node(&mut g, &mut r);
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn add_edge_respects_simple_graph_invariant() {
        let mut g = Graph::new(GraphAttrs::simple_directed());
        for _ in 0..5 {
            g.add_node();
        }
        let mut r = rand();
        for _ in 0..500 {
            add_edge(&mut g, &mut r);
        }
        assert!(g.validate().is_ok());
    }
}
