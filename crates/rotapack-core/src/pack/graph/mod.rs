//! Interaction-graph representations of a packing problem.
//!
//! All four representations answer the same queries over the same node and
//! state numbering; they differ only in when two-body energies are computed
//! and how much of them is retained:
//!
//! - [`dense::PrecomputedGraph`] computes every edge table up front,
//! - [`lazy::LazyGraph`] computes on every query and stores nothing,
//! - [`lazy::DoubleLazyGraph`] fills whole edge tables on first touch and
//!   evicts them under a byte cap,
//! - [`linmem::LinearMemoryGraph`] keeps a short per-edge history of recent
//!   state pairs.
//!
//! [`multiplex::MultiplexedGraph`] layers whole-structure score terms on
//! top of any of them.

pub mod dense;
pub mod lazy;
pub mod linmem;
pub mod multiplex;

use super::rotamer_sets::RotamerSets;
use super::score::ScoreFunction;
use std::collections::HashMap;
use std::sync::Arc;

/// Computes the interaction energy between one state of one node and one
/// state of another. Implementations must be pure functions of their
/// arguments; every graph representation relies on recomputation yielding
/// identical values.
pub trait TwoBodyEvaluator: Send + Sync {
    fn two_body(&self, node_a: usize, state_a: usize, node_b: usize, state_b: usize) -> f64;
}

/// The production evaluator: the pairwise potential between two candidate
/// rotamers' interaction centers.
pub struct PackingEvaluator {
    sets: Arc<RotamerSets>,
    score: ScoreFunction,
}

impl PackingEvaluator {
    pub fn new(sets: Arc<RotamerSets>, score: ScoreFunction) -> Self {
        Self { sets, score }
    }
}

impl TwoBodyEvaluator for PackingEvaluator {
    fn two_body(&self, node_a: usize, state_a: usize, node_b: usize, state_b: usize) -> f64 {
        let a = self.sets.rotamer(node_a, state_a);
        let b = self.sets.rotamer(node_b, state_b);
        self.score.pair_energy(&a.center, &b.center)
    }
}

/// The query surface shared by every representation. The optimizer sees
/// nodes `0..num_nodes`, each with states `0..num_states(node)`, and asks
/// for one-body and two-body energies; `two_body_energy` takes `&mut self`
/// because the on-demand representations update internal caches.
pub trait InteractionGraph {
    fn name(&self) -> &'static str;
    fn num_nodes(&self) -> usize;
    fn num_states(&self, node: usize) -> usize;
    fn one_body_energy(&self, node: usize, state: usize) -> f64;
    fn two_body_energy(
        &mut self,
        node_a: usize,
        state_a: usize,
        node_b: usize,
        state_b: usize,
    ) -> f64;
    fn edges(&self) -> Vec<(usize, usize)>;
    /// Scales all two-body energies of one edge; unknown edges are ignored.
    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64);
    fn total_memory_usage(&self) -> usize;

    /// Energy of a complete assignment (one state per node).
    fn total_energy(&mut self, assignment: &[usize]) -> f64 {
        debug_assert_eq!(assignment.len(), self.num_nodes());
        let mut total = 0.0;
        for (node, &state) in assignment.iter().enumerate() {
            total += self.one_body_energy(node, state);
        }
        for (a, b) in self.edges() {
            total += self.two_body_energy(a, assignment[a], b, assignment[b]);
        }
        total
    }
}

pub(crate) struct EdgeData {
    pub a: usize,
    pub b: usize,
    pub weight: f64,
}

/// State shared by every concrete representation: one-body tables, the
/// weighted edge list, and the evaluator that defines two-body energies.
pub(crate) struct GraphBase {
    pub one_body: Vec<Vec<f64>>,
    pub edges: Vec<EdgeData>,
    pub edge_lookup: HashMap<(usize, usize), usize>,
    pub evaluator: Arc<dyn TwoBodyEvaluator>,
}

impl GraphBase {
    pub fn new(
        one_body: Vec<Vec<f64>>,
        edges: &[(usize, usize)],
        evaluator: Arc<dyn TwoBodyEvaluator>,
    ) -> Self {
        let edges: Vec<EdgeData> = edges
            .iter()
            .map(|&(a, b)| EdgeData {
                a: a.min(b),
                b: a.max(b),
                weight: 1.0,
            })
            .collect();
        let edge_lookup = edges
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.a, e.b), i))
            .collect();
        Self {
            one_body,
            edges,
            edge_lookup,
            evaluator,
        }
    }

    pub fn num_states(&self, node: usize) -> usize {
        self.one_body[node].len()
    }

    pub fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_lookup.get(&(a.min(b), a.max(b))).copied()
    }

    /// Weighted two-body energy for one edge, always recomputed.
    pub fn compute(&self, edge: usize, state_a: usize, state_b: usize) -> f64 {
        let e = &self.edges[edge];
        e.weight * self.evaluator.two_body(e.a, state_a, e.b, state_b)
    }

    pub fn edge_pairs(&self) -> Vec<(usize, usize)> {
        self.edges.iter().map(|e| (e.a, e.b)).collect()
    }

    pub fn set_edge_weight(&mut self, a: usize, b: usize, weight: f64) {
        if let Some(idx) = self.edge_index(a, b) {
            self.edges[idx].weight = weight;
        }
    }

    pub fn one_body_bytes(&self) -> usize {
        self.one_body
            .iter()
            .map(|s| s.len() * std::mem::size_of::<f64>())
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A cheap deterministic evaluator for representation tests; counts
    /// invocations so caching behavior is observable.
    pub struct CountingEvaluator {
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingEvaluator {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl TwoBodyEvaluator for CountingEvaluator {
        fn two_body(&self, a: usize, sa: usize, b: usize, sb: usize) -> f64 {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (a + 1) as f64 * (sa as f64 + 0.5) - (b + 1) as f64 * (sb as f64 - 0.25)
        }
    }

    /// Three nodes in a path (0-1, 1-2) with 2, 3, and 2 states.
    pub fn path_problem() -> (Vec<Vec<f64>>, Vec<(usize, usize)>) {
        let one_body = vec![vec![0.1, 0.2], vec![0.3, 0.0, 0.6], vec![0.4, 0.5]];
        let edges = vec![(0, 1), (1, 2)];
        (one_body, edges)
    }
}
