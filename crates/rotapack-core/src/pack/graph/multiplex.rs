use super::InteractionGraph;
use crate::pack::rotamer_sets::RotamerSets;
use crate::pack::score::{is_hydrophobic, is_polar};
use itertools::Itertools;
use std::sync::Arc;

/// A score term evaluated over a complete assignment rather than per node
/// or per edge. These terms cannot be decomposed onto graph edges, so the
/// multiplexed graph applies them only when whole assignments are scored.
pub trait WholeStructureEvaluator: Send + Sync {
    fn name(&self) -> &'static str;
    fn energy(&self, assignment: &[usize]) -> f64;
}

/// Wraps any representation and layers whole-structure terms on top of it.
/// Node, state, and edge queries delegate unchanged; only `total_energy`
/// differs.
pub struct MultiplexedGraph {
    inner: Box<dyn InteractionGraph>,
    decorations: Vec<Box<dyn WholeStructureEvaluator>>,
}

impl MultiplexedGraph {
    pub fn new(
        inner: Box<dyn InteractionGraph>,
        decorations: Vec<Box<dyn WholeStructureEvaluator>>,
    ) -> Self {
        Self { inner, decorations }
    }

    pub fn decoration_names(&self) -> Vec<&'static str> {
        self.decorations.iter().map(|d| d.name()).collect()
    }

    pub fn decoration_energy(&self, assignment: &[usize]) -> f64 {
        self.decorations
            .iter()
            .map(|d| d.energy(assignment))
            .sum()
    }
}

impl InteractionGraph for MultiplexedGraph {
    fn name(&self) -> &'static str {
        "multiplexed"
    }

    fn num_nodes(&self) -> usize {
        self.inner.num_nodes()
    }

    fn num_states(&self, node: usize) -> usize {
        self.inner.num_states(node)
    }

    fn one_body_energy(&self, node: usize, state: usize) -> f64 {
        self.inner.one_body_energy(node, state)
    }

    fn two_body_energy(
        &mut self,
        node_a: usize,
        state_a: usize,
        node_b: usize,
        state_b: usize,
    ) -> f64 {
        self.inner.two_body_energy(node_a, state_a, node_b, state_b)
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.inner.edges()
    }

    fn set_edge_weight(&mut self, node_a: usize, node_b: usize, weight: f64) {
        self.inner.set_edge_weight(node_a, node_b, weight);
    }

    fn total_memory_usage(&self) -> usize {
        self.inner.total_memory_usage()
    }

    fn total_energy(&mut self, assignment: &[usize]) -> f64 {
        self.inner.total_energy(assignment) + self.decoration_energy(assignment)
    }
}

/// Penalizes exposed positions: each chosen rotamer with fewer than six
/// other chosen centers within the contact radius pays proportionally.
pub struct SurfaceEvaluator {
    sets: Arc<RotamerSets>,
    weight: f64,
}

impl SurfaceEvaluator {
    const CONTACT_RADIUS: f64 = 8.0;
    const BURIAL_CONTACTS: f64 = 6.0;

    pub fn new(sets: Arc<RotamerSets>, weight: f64) -> Self {
        Self { sets, weight }
    }
}

impl WholeStructureEvaluator for SurfaceEvaluator {
    fn name(&self) -> &'static str {
        "surface"
    }

    fn energy(&self, assignment: &[usize]) -> f64 {
        let centers: Vec<_> = assignment
            .iter()
            .enumerate()
            .map(|(node, &state)| self.sets.rotamer(node, state).center)
            .collect();
        let mut total = 0.0;
        for (i, center) in centers.iter().enumerate() {
            let contacts = centers
                .iter()
                .enumerate()
                .filter(|&(j, other)| i != j && (center - other).norm() <= Self::CONTACT_RADIUS)
                .count() as f64;
            total += (Self::BURIAL_CONTACTS - contacts).max(0.0) / Self::BURIAL_CONTACTS;
        }
        self.weight * total
    }
}

/// Penalizes contiguous hydrophobic surface: every pair of chosen
/// hydrophobic rotamers within the patch radius adds to the patch score.
pub struct HPatchEvaluator {
    sets: Arc<RotamerSets>,
    weight: f64,
}

impl HPatchEvaluator {
    const PATCH_RADIUS: f64 = 6.0;

    pub fn new(sets: Arc<RotamerSets>, weight: f64) -> Self {
        Self { sets, weight }
    }
}

impl WholeStructureEvaluator for HPatchEvaluator {
    fn name(&self) -> &'static str {
        "hpatch"
    }

    fn energy(&self, assignment: &[usize]) -> f64 {
        let chosen: Vec<_> = assignment
            .iter()
            .enumerate()
            .map(|(node, &state)| self.sets.rotamer(node, state))
            .filter(|r| is_hydrophobic(r.amino_acid))
            .collect();
        let pairs = chosen
            .iter()
            .tuple_combinations()
            .filter(|(a, b)| (a.center - b.center).norm() <= Self::PATCH_RADIUS)
            .count();
        self.weight * pairs as f64
    }
}

/// Non-pairwise-decomposable hydrogen bonding: each polar rotamer is
/// rewarded for its single best partner only, so the term cannot be summed
/// over edges independently.
pub struct NpdHbondEvaluator {
    sets: Arc<RotamerSets>,
    weight: f64,
}

impl NpdHbondEvaluator {
    const IDEAL_DISTANCE: f64 = 2.8;
    const MAX_DISTANCE: f64 = 3.5;

    pub fn new(sets: Arc<RotamerSets>, weight: f64) -> Self {
        Self { sets, weight }
    }
}

impl WholeStructureEvaluator for NpdHbondEvaluator {
    fn name(&self) -> &'static str {
        "npd-hbond"
    }

    fn energy(&self, assignment: &[usize]) -> f64 {
        let chosen: Vec<_> = assignment
            .iter()
            .enumerate()
            .map(|(node, &state)| self.sets.rotamer(node, state))
            .collect();
        let mut total = 0.0;
        for (i, r) in chosen.iter().enumerate() {
            if !is_polar(r.amino_acid) {
                continue;
            }
            let best = chosen
                .iter()
                .enumerate()
                .filter(|&(j, other)| {
                    i != j
                        && is_polar(other.amino_acid)
                        && (r.center - other.center).norm() <= Self::MAX_DISTANCE
                })
                .map(|(_, other)| {
                    let d = (r.center - other.center).norm() - Self::IDEAL_DISTANCE;
                    -(-d * d / 0.5).exp()
                })
                .fold(0.0f64, f64::min);
            total += best;
        }
        self.weight * total
    }
}
