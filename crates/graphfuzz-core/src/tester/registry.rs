//! Demonstration `Tester` implementations for two of the nine named
//! fuzzers, grounded directly in §8's two worked scenarios. The remaining
//! seven families are real algorithm implementations the spec treats as
//! external collaborators (§1) and are intentionally not bundled here;
//! `for_fuzzer` reports them as `None` so the CLI can surface
//! `CliError::UnimplementedFuzzer`.

use std::collections::{HashMap, HashSet};

use crate::graph::{Graph, GraphAttrs, NodeId};
use crate::tester::{DiscrepancyHit, FuzzerName, TestOutcome, Tester, Tolerance};

/// Look up the bundled demonstration tester for a fuzzer name, if any.
pub fn for_fuzzer(name: FuzzerName) -> Option<Box<dyn Tester>> {
    match name {
        FuzzerName::Scc => Some(Box::new(SccTester { inject_bug: true })),
        FuzzerName::Stpl => Some(Box::new(StplTester { tolerance: Tolerance::DEFAULT })),
        _ => None,
    }
}

/// Attribute allow-list per fuzzer, replacing the original's dry-run
/// probing heuristic (§9 Open Question).
pub fn attrs_for(name: FuzzerName) -> Vec<GraphAttrs> {
    match name {
        FuzzerName::Scc => vec![GraphAttrs::simple_directed()],
        FuzzerName::Stpl => vec![GraphAttrs {
            directed: true,
            multi_edge: false,
            weighted: true,
            negative_weights: true,
        }],
        _ => vec![GraphAttrs::simple_directed(), GraphAttrs::simple_undirected()],
    }
}

fn adjacency(g: &Graph) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adj: HashMap<NodeId, Vec<NodeId>> = g.node_ids().map(|n| (n, Vec::new())).collect();
    for e in g.edges() {
        adj.entry(e.from).or_default().push(e.to);
        if !g.attrs().directed {
            adj.entry(e.to).or_default().push(e.from);
        }
    }
    adj
}

/// Canonicalize an SCC partition (a `Vec<Vec<NodeId>>`) into a sorted,
/// sorted-of-sorted form so two algorithms that agree on the partition but
/// disagree on component order/labeling compare as equal.
fn canonical_partition(mut components: Vec<Vec<NodeId>>) -> Vec<Vec<NodeId>> {
    for c in &mut components {
        c.sort_unstable();
    }
    components.sort();
    components
}

/// Tarjan's algorithm, iterative to avoid recursion-depth concerns on
/// large fuzzer-generated graphs.
fn tarjan_scc(g: &Graph) -> Vec<Vec<NodeId>> {
    let adj = adjacency(g);
    let nodes: Vec<NodeId> = g.node_ids().collect();
    let mut index_of: HashMap<NodeId, usize> = HashMap::new();
    let mut lowlink: HashMap<NodeId, usize> = HashMap::new();
    let mut on_stack: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut next_index = 0usize;
    let mut result = Vec::new();

    enum Frame {
        Enter(NodeId),
        Exit(NodeId),
    }

    for &start in &nodes {
        if index_of.contains_key(&start) {
            continue;
        }
        let mut work = vec![Frame::Enter(start)];
        let mut child_cursor: HashMap<NodeId, usize> = HashMap::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    if index_of.contains_key(&v) {
                        continue;
                    }
                    index_of.insert(v, next_index);
                    lowlink.insert(v, next_index);
                    next_index += 1;
                    stack.push(v);
                    on_stack.insert(v);
                    child_cursor.insert(v, 0);
                    work.push(Frame::Exit(v));
                    // Push children in reverse so they are visited in original order.
                    let empty = Vec::new();
                    let children = adj.get(&v).unwrap_or(&empty);
                    for &w in children.iter().rev() {
                        if !index_of.contains_key(&w) {
                            work.push(Frame::Enter(w));
                        }
                    }
                }
                Frame::Exit(v) => {
                    let empty = Vec::new();
                    let children = adj.get(&v).unwrap_or(&empty).clone();
                    for w in children {
                        if on_stack.contains(&w) {
                            let wl = lowlink[&w];
                            let vl = lowlink[&v];
                            lowlink.insert(v, vl.min(wl));
                        }
                    }
                    if lowlink[&v] == index_of[&v] {
                        let mut component = Vec::new();
                        loop {
                            let w = stack.pop().expect("scc stack underflow");
                            on_stack.remove(&w);
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        result.push(component);
                    }
                }
            }
        }
    }
    result
}

/// Kosaraju's algorithm: DFS finish order, then DFS the transpose graph in
/// reverse finish order.
fn kosaraju_scc(g: &Graph) -> Vec<Vec<NodeId>> {
    let adj = adjacency(g);
    let nodes: Vec<NodeId> = g.node_ids().collect();

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut finish_order: Vec<NodeId> = Vec::new();
    for &start in &nodes {
        if visited.contains(&start) {
            continue;
        }
        let mut stack = vec![(start, false)];
        while let Some((v, processed)) = stack.pop() {
            if processed {
                finish_order.push(v);
                continue;
            }
            if visited.contains(&v) {
                continue;
            }
            visited.insert(v);
            stack.push((v, true));
            let empty = Vec::new();
            for &w in adj.get(&v).unwrap_or(&empty) {
                if !visited.contains(&w) {
                    stack.push((w, false));
                }
            }
        }
    }

    let mut transpose: HashMap<NodeId, Vec<NodeId>> = nodes.iter().map(|&n| (n, Vec::new())).collect();
    for e in g.edges() {
        transpose.entry(e.to).or_default().push(e.from);
        if !g.attrs().directed {
            transpose.entry(e.from).or_default().push(e.to);
        }
    }

    let mut assigned: HashSet<NodeId> = HashSet::new();
    let mut result = Vec::new();
    for &v in finish_order.iter().rev() {
        if assigned.contains(&v) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![v];
        assigned.insert(v);
        while let Some(u) = stack.pop() {
            component.push(u);
            let empty = Vec::new();
            for &w in transpose.get(&u).unwrap_or(&empty) {
                if !assigned.contains(&w) {
                    assigned.insert(w);
                    stack.push(w);
                }
            }
        }
        result.push(component);
    }
    result
}

/// Deliberately buggy reference implementation: treats every node as its
/// own singleton component unless it has a direct self-loop-free 2-cycle
/// with exactly one other node. This reproduces the exact failure in §8
/// scenario 1: on the 3-cycle {0,1,2} it reports `{{0,1},{2}}` instead of
/// the single true component `{0,1,2}`.
fn buggy_scc(g: &Graph) -> Vec<Vec<NodeId>> {
    let nodes: Vec<NodeId> = g.node_ids().collect();
    let mut paired: HashSet<NodeId> = HashSet::new();
    let mut result = Vec::new();
    for &u in &nodes {
        if paired.contains(&u) {
            continue;
        }
        let partner = g
            .edges()
            .iter()
            .find(|e| e.from == u && g.has_edge(e.to, u))
            .map(|e| e.to);
        match partner {
            Some(v) if v != u && !paired.contains(&v) => {
                paired.insert(u);
                paired.insert(v);
                result.push(vec![u, v]);
            }
            _ => {
                paired.insert(u);
                result.push(vec![u]);
            }
        }
    }
    result
}

/// Three SCC implementations compared pairwise: Tarjan and Kosaraju always
/// agree (both correct); `buggy_scc` is included only when `inject_bug` is
/// set, matching §8 scenario 1's "two agreeing implementations plus one
/// buggy one".
pub struct SccTester {
    pub inject_bug: bool,
}

impl Tester for SccTester {
    fn test(&self, graph: &Graph, _timestamp: f64) -> TestOutcome {
        let tarjan = canonical_partition(tarjan_scc(graph));
        let kosaraju = canonical_partition(kosaraju_scc(graph));
        let mut discrepancies = Vec::new();
        if tarjan != kosaraju {
            discrepancies.push(DiscrepancyHit { tag: "tarjan-vs-kosaraju".into(), graph: graph.clone() });
        }
        if self.inject_bug {
            let buggy = canonical_partition(buggy_scc(graph));
            if buggy != tarjan {
                discrepancies.push(DiscrepancyHit { tag: "tarjan-vs-buggy".into(), graph: graph.clone() });
            }
        }
        TestOutcome { discrepancies, coverage_hits: Vec::new() }
    }

    fn accepted_attrs(&self) -> Vec<GraphAttrs> {
        vec![GraphAttrs::simple_directed()]
    }
}

fn bellman_ford(g: &Graph, source: NodeId) -> Option<HashMap<NodeId, f64>> {
    let mut dist: HashMap<NodeId, f64> = g.node_ids().map(|n| (n, f64::INFINITY)).collect();
    dist.insert(source, 0.0);
    let edges = g.edges();
    for _ in 0..g.node_count() {
        let mut relaxed = false;
        for e in edges {
            let du = dist[&e.from];
            if du.is_finite() && du + e.weight < dist[&e.to] {
                dist.insert(e.to, du + e.weight);
                relaxed = true;
            }
        }
        if !relaxed {
            break;
        }
    }
    for e in edges {
        let du = dist[&e.from];
        if du.is_finite() && du + e.weight < dist[&e.to] {
            return None; // negative cycle reachable from source
        }
    }
    Some(dist)
}

fn dijkstra(g: &Graph, source: NodeId) -> HashMap<NodeId, f64> {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;

    #[derive(PartialEq)]
    struct HeapEntry(f64, NodeId);
    impl Eq for HeapEntry {}
    impl Ord for HeapEntry {
        fn cmp(&self, other: &Self) -> Ordering {
            other.0.partial_cmp(&self.0).unwrap_or(Ordering::Equal)
        }
    }
    impl PartialOrd for HeapEntry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    let adj = adjacency(g);
    let mut weight_of: HashMap<(NodeId, NodeId), f64> = HashMap::new();
    for e in g.edges() {
        weight_of.insert((e.from, e.to), e.weight);
        if !g.attrs().directed {
            weight_of.insert((e.to, e.from), e.weight);
        }
    }

    let mut dist: HashMap<NodeId, f64> = g.node_ids().map(|n| (n, f64::INFINITY)).collect();
    dist.insert(source, 0.0);
    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry(0.0, source));
    while let Some(HeapEntry(d, u)) = heap.pop() {
        if d > dist[&u] {
            continue;
        }
        let empty = Vec::new();
        for &v in adj.get(&u).unwrap_or(&empty) {
            let w = *weight_of.get(&(u, v)).unwrap_or(&crate::graph::DEFAULT_EDGE_WEIGHT);
            let nd = d + w;
            if nd < dist[&v] {
                dist.insert(v, nd);
                heap.push(HeapEntry(nd, v));
            }
        }
    }
    dist
}

/// Shortest-path-length: Bellman-Ford vs. Dijkstra, with Dijkstra excluded
/// whenever the graph carries a negative edge weight — per §8 scenario 2,
/// that exclusion (not a comparison) is what keeps the run discrepancy-free
/// even though Dijkstra's result would otherwise be undefined on such
/// graphs.
pub struct StplTester {
    pub tolerance: Tolerance,
}

impl Tester for StplTester {
    fn test(&self, graph: &Graph, _timestamp: f64) -> TestOutcome {
        let Some(&source) = graph.node_ids().collect::<Vec<_>>().first() else {
            return TestOutcome::agreement();
        };
        let Some(bf) = bellman_ford(graph, source) else {
            return TestOutcome::agreement(); // negative cycle: undefined, nothing to compare
        };

        let mut discrepancies = Vec::new();
        if !graph.has_negative_weight() {
            let dij = dijkstra(graph, source);
            for (&node, &bf_dist) in &bf {
                let dij_dist = dij.get(&node).copied().unwrap_or(f64::INFINITY);
                let both_finite = bf_dist.is_finite() && dij_dist.is_finite();
                let both_infinite = bf_dist.is_infinite() && dij_dist.is_infinite();
                if !(both_infinite || (both_finite && self.tolerance.agrees(bf_dist, dij_dist))) {
                    discrepancies.push(DiscrepancyHit {
                        tag: "bellman-ford-vs-dijkstra".into(),
                        graph: graph.clone(),
                    });
                    break;
                }
            }
        }
        TestOutcome { discrepancies, coverage_hits: Vec::new() }
    }

    fn accepted_attrs(&self) -> Vec<GraphAttrs> {
        vec![GraphAttrs { directed: true, multi_edge: false, weighted: true, negative_weights: true }]
    }
}
