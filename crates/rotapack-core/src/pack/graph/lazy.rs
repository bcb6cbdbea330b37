use super::{GraphBase, InteractionGraph, TwoBodyEvaluator};
use std::sync::Arc;
use tracing::trace;

/// The zero-storage representation: every two-body query goes straight to
/// the evaluator. Cheapest to build, most expensive per query.
pub struct LazyGraph {
    base: GraphBase,
}

impl LazyGraph {
    pub fn new(
        one_body: Vec<Vec<f64>>,
        edges: &[(usize, usize)],
        evaluator: Arc<dyn TwoBodyEvaluator>,
    ) -> Self {
        Self {
            base: GraphBase::new(one_body, edges, evaluator),
        }
    }
}

impl InteractionGraph for LazyGraph {
    fn name(&self) -> &'static str {
        "lazy"
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
        self.base.compute(idx, sa, sb)
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.base.edge_pairs()
    }

    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64) {
        self.base.set_edge_weight(node_a, node_b, weight);
    }

    fn total_memory_usage(&self) -> usize {
        self.base.one_body_bytes()
    }
}

/// The doubly lazy representation: whole edge tables are computed on first
/// touch and retained, subject to a byte cap enforced by least-recently-
/// used whole-table eviction.
pub struct DoubleLazyGraph {
    base: GraphBase,
    tables: Vec<Option<Vec<f64>>>,
    last_touch: Vec<u64>,
    clock: u64,
    table_bytes: usize,
    memory_limit: Option<usize>,
}

impl DoubleLazyGraph {
    pub fn new(
        one_body: Vec<Vec<f64>>,
        edges: &[(usize, usize)],
        evaluator: Arc<dyn TwoBodyEvaluator>,
        memory_limit: Option<usize>,
    ) -> Self {
        let base = GraphBase::new(one_body, edges, evaluator);
        let n_edges = base.edges.len();
        Self {
            base,
            tables: (0..n_edges).map(|_| None).collect(),
            last_touch: vec![0; n_edges],
            clock: 0,
            table_bytes: 0,
            memory_limit,
        }
    }

    fn ensure_table(&mut self, idx: usize) {
        if self.tables[idx].is_some() {
            return;
        }
        let edge = &self.base.edges[idx];
        let na = self.base.num_states(edge.a);
        let nb = self.base.num_states(edge.b);
        let mut table = Vec::with_capacity(na * nb);
        for sa in 0..na {
            for sb in 0..nb {
                table.push(self.base.evaluator.two_body(edge.a, sa, edge.b, sb));
            }
        }
        self.table_bytes += table.len() * std::mem::size_of::<f64>();
        self.tables[idx] = Some(table);
        self.evict_over_limit(idx);
    }

    /// Drops least-recently-touched tables until the cap is met again. The
    /// table just filled is exempt so the current query can be answered.
    fn evict_over_limit(&mut self, keep: usize) {
        let Some(limit) = self.memory_limit else {
            return;
        };
        while self.table_bytes > limit {
            let victim = self
                .tables
                .iter()
                .enumerate()
                .filter(|(i, t)| *i != keep && t.is_some())
                .min_by_key(|(i, _)| self.last_touch[*i])
                .map(|(i, _)| i);
            let Some(victim) = victim else {
                break;
            };
            if let Some(table) = self.tables[victim].take() {
                self.table_bytes -= table.len() * std::mem::size_of::<f64>();
                trace!(edge = victim, "Evicted edge table");
            }
        }
    }
}

impl InteractionGraph for DoubleLazyGraph {
    fn name(&self) -> &'static str {
        "double-lazy"
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
        self.ensure_table(idx);
        self.clock += 1;
        self.last_touch[idx] = self.clock;

        let edge = &self.base.edges[idx];
        let (sa, sb) = if node_a == edge.a {
            (state_a, state_b)
        } else {
            (state_b, state_a)
        };
        let nb = self.base.num_states(edge.b);
        match &self.tables[idx] {
            Some(table) => edge.weight * table[sa * nb + sb],
            // Unreachable in practice: ensure_table never evicts `idx`.
            None => self.base.compute(idx, sa, sb),
        }
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.base.edge_pairs()
    }

    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64) {
        self.base.set_edge_weight(node_a, node_b, weight);
    }

    fn total_memory_usage(&self) -> usize {
        self.base.one_body_bytes() + self.table_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::graph::test_support::{CountingEvaluator, path_problem};

    #[test]
    fn lazy_recomputes_on_every_query() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        let mut graph = LazyGraph::new(one_body, &edges, evaluator.clone());

        assert_eq!(evaluator.call_count(), 0);
        let first = graph.two_body_energy(0, 1, 1, 2);
        let second = graph.two_body_energy(0, 1, 1, 2);
        assert_eq!(first, second);
        assert_eq!(evaluator.call_count(), 2);
    }

    #[test]
    fn double_lazy_fills_a_whole_table_once() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        let mut graph = DoubleLazyGraph::new(one_body, &edges, evaluator.clone(), None);

        let _ = graph.two_body_energy(0, 0, 1, 0);
        // Edge (0,1) has 2x3 states.
        assert_eq!(evaluator.call_count(), 6);
        let _ = graph.two_body_energy(0, 1, 1, 2);
        assert_eq!(evaluator.call_count(), 6);
        // Touching the other edge fills its 3x2 table.
        let _ = graph.two_body_energy(1, 0, 2, 0);
        assert_eq!(evaluator.call_count(), 12);
    }

    #[test]
    fn double_lazy_evicts_under_a_byte_cap() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        // Cap fits one 6-entry table but not two.
        let cap = 6 * std::mem::size_of::<f64>();
        let mut graph = DoubleLazyGraph::new(one_body, &edges, evaluator.clone(), Some(cap));

        let _ = graph.two_body_energy(0, 0, 1, 0);
        let _ = graph.two_body_energy(1, 0, 2, 0); // evicts edge (0,1)
        assert!(graph.total_memory_usage() <= cap + graph.base.one_body_bytes());
        assert_eq!(evaluator.call_count(), 12);

        // Edge (0,1) must be recomputed after eviction.
        let _ = graph.two_body_energy(0, 0, 1, 0);
        assert_eq!(evaluator.call_count(), 18);
    }

    #[test]
    fn representations_agree_on_values() {
        let (one_body, edges) = path_problem();
        let evaluator = CountingEvaluator::new();
        let mut lazy = LazyGraph::new(one_body.clone(), &edges, evaluator.clone());
        let mut dlazy = DoubleLazyGraph::new(one_body, &edges, evaluator, None);

        for (a, b) in [(0usize, 1usize), (1, 2)] {
            for sa in 0..lazy.num_states(a) {
                for sb in 0..lazy.num_states(b) {
                    assert_eq!(
                        lazy.two_body_energy(a, sa, b, sb),
                        dlazy.two_body_energy(a, sa, b, sb)
                    );
                }
            }
        }
    }
}
