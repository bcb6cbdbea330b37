use super::{GraphBase, InteractionGraph, TwoBodyEvaluator};
use std::collections::VecDeque;
use std::sync::Arc;

/// One cached state-pair energy on one edge.
#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    state_a: usize,
    state_b: usize,
    energy: f64,
}

/// The linear-memory representation: each edge remembers only its most
/// recently queried state pairs, up to a fixed history depth. Memory grows
/// linearly with the number of edges instead of with the product of state
/// counts, at the price of recomputing energies that fall out of the
/// history. Annealing-style optimizers revisit recent pairs often enough
/// that a short history absorbs most queries.
pub struct LinearMemoryGraph {
    base: GraphBase,
    history: Vec<VecDeque<HistoryEntry>>,
    history_size: usize,
}

impl LinearMemoryGraph {
    pub fn new(
        one_body: Vec<Vec<f64>>,
        edges: &[(usize, usize)],
        evaluator: Arc<dyn TwoBodyEvaluator>,
        history_size: usize,
    ) -> Self {
        debug_assert!(history_size >= 1);
        let base = GraphBase::new(one_body, edges, evaluator);
        let history = (0..base.edges.len())
            .map(|_| VecDeque::with_capacity(history_size))
            .collect();
        Self {
            base,
            history,
            history_size,
        }
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }
}

impl InteractionGraph for LinearMemoryGraph {
    fn name(&self) -> &'static str {
        "linear-memory"
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
        let (sa, sb) = if node_a == edge.a {
            (state_a, state_b)
        } else {
            (state_b, state_a)
        };

        let history = &mut self.history[idx];
        if let Some(pos) = history
            .iter()
            .position(|e| e.state_a == sa && e.state_b == sb)
        {
            // Refresh recency.
            let entry = history.remove(pos).unwrap_or(HistoryEntry {
                state_a: sa,
                state_b: sb,
                energy: 0.0,
            });
            history.push_back(entry);
            return edge.weight * entry.energy;
        }

        let energy = self.base.evaluator.two_body(edge.a, sa, edge.b, sb);
        if history.len() == self.history_size {
            history.pop_front();
        }
        history.push_back(HistoryEntry {
            state_a: sa,
            state_b: sb,
            energy,
        });
        edge.weight * energy
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.base.edge_pairs()
    }

    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64) {
        self.base.set_edge_weight(node_a, node_b, weight);
    }

    fn total_memory_usage(&self) -> usize {
        self.base.one_body_bytes()
            + self.history.len() * self.history_size * std::mem::size_of::<HistoryEntry>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::graph::test_support::{CountingEvaluator, path_problem};

    #[test]
    fn recent_pairs_are_served_from_history() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        let mut graph = LinearMemoryGraph::new(one_body, &edges, evaluator.clone(), 4);

        let first = graph.two_body_energy(0, 1, 1, 2);
        assert_eq!(evaluator.call_count(), 1);
        let again = graph.two_body_energy(0, 1, 1, 2);
        assert_eq!(evaluator.call_count(), 1);
        assert_eq!(first, again);
        // Orientation-insensitive hit.
        let flipped = graph.two_body_energy(1, 2, 0, 1);
        assert_eq!(evaluator.call_count(), 1);
        assert_eq!(first, flipped);
    }

    #[test]
    fn history_depth_bounds_retention() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        let mut graph = LinearMemoryGraph::new(one_body, &edges, evaluator.clone(), 2);

        let _ = graph.two_body_energy(0, 0, 1, 0);
        let _ = graph.two_body_energy(0, 0, 1, 1);
        let _ = graph.two_body_energy(0, 0, 1, 2); // evicts (0,0)
        assert_eq!(evaluator.call_count(), 3);
        let _ = graph.two_body_energy(0, 0, 1, 0); // recompute
        assert_eq!(evaluator.call_count(), 4);
        // (0,2) survived the refill and is still a hit.
        let _ = graph.two_body_energy(0, 0, 1, 2);
        assert_eq!(evaluator.call_count(), 4);
    }

    #[test]
    fn memory_usage_is_independent_of_state_counts() {
        let small = LinearMemoryGraph::new(
            vec![vec![0.0; 2], vec![0.0; 2]],
            &[(0, 1)],
            CountingEvaluator::new(),
            8,
        );
        let large = LinearMemoryGraph::new(
            vec![vec![0.0; 200], vec![0.0; 200]],
            &[(0, 1)],
            CountingEvaluator::new(),
            8,
        );
        let history_bytes =
            |g: &LinearMemoryGraph| g.total_memory_usage() - g.base.one_body_bytes();
        assert_eq!(history_bytes(&small), history_bytes(&large));
    }
}
