use super::{GraphBase, InteractionGraph, TwoBodyEvaluator};
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// The fully precomputed representation: one flat `states_a x states_b`
/// table per edge, filled at construction. Queries are array lookups; the
/// cost is paid up front and in memory.
pub struct PrecomputedGraph {
    base: GraphBase,
    /// Unweighted energies, `tables[edge][state_a * states_b + state_b]`.
    tables: Vec<Vec<f64>>,
}

impl PrecomputedGraph {
    pub fn new(
        one_body: Vec<Vec<f64>>,
        edges: &[(usize, usize)],
        evaluator: Arc<dyn TwoBodyEvaluator>,
    ) -> Self {
        let base = GraphBase::new(one_body, edges, evaluator);

        let fill = |edge: &super::EdgeData| -> Vec<f64> {
            let na = base.one_body[edge.a].len();
            let nb = base.one_body[edge.b].len();
            let mut table = Vec::with_capacity(na * nb);
            for sa in 0..na {
                for sb in 0..nb {
                    table.push(base.evaluator.two_body(edge.a, sa, edge.b, sb));
                }
            }
            table
        };

        #[cfg(feature = "parallel")]
        let tables: Vec<Vec<f64>> = base.edges.par_iter().map(fill).collect();
        #[cfg(not(feature = "parallel"))]
        let tables: Vec<Vec<f64>> = base.edges.iter().map(fill).collect();

        let graph = Self { base, tables };
        debug!(
            edges = graph.base.edges.len(),
            bytes = graph.total_memory_usage(),
            "Precomputed all edge tables"
        );
        graph
    }
}

impl InteractionGraph for PrecomputedGraph {
    fn name(&self) -> &'static str {
        "precomputed"
    }

    fn num_nodes(&self) -> usize {
        self.base.one_body.len()
    }

    fn num_states(&self, node: usize) -> usize {
        self.base.num_states(node)
    }

    fn one_body_energy(&self, node: usize, state: usize) -> f64 {
        self.base.one_body[node][state]
    }

    fn two_body_energy(
        &mut self,
        node_a: usize,
        state_a: usize,
        node_b: usize,
        state_b: usize,
    ) -> f64 {
        let Some(idx) = self.base.edge_index(node_a, node_b) else {
            return 0.0;
        };
        let edge = &self.base.edges[idx];
        // Tables are stored in canonical (lower, upper) orientation.
        let (sa, sb) = if node_a == edge.a {
            (state_a, state_b)
        } else {
            (state_b, state_a)
        };
        let nb = self.base.num_states(edge.b);
        edge.weight * self.tables[idx][sa * nb + sb]
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.base.edge_pairs()
    }

    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64) {
        self.base.set_edge_weight(node_a, node_b, weight);
    }

    fn total_memory_usage(&self) -> usize {
        self.base.one_body_bytes()
            + self
                .tables
                .iter()
                .map(|t| t.len() * std::mem::size_of::<f64>())
                .sum::<usize>()
    }
}
