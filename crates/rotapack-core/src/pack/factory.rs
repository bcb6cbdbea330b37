use super::error::PackError;
use super::graph::dense::PrecomputedGraph;
use super::graph::lazy::{DoubleLazyGraph, LazyGraph};
use super::graph::linmem::LinearMemoryGraph;
use super::graph::multiplex::{
    HPatchEvaluator, MultiplexedGraph, NpdHbondEvaluator, SurfaceEvaluator, WholeStructureEvaluator,
};
use super::graph::{InteractionGraph, PackingEvaluator};
use super::neighbor::NeighborGraph;
use super::rotamer_sets::RotamerSets;
use super::score::{ScoreFunction, ScoreTerm};
use super::task::{IgRequest, PackerTask};
use crate::core::dunbrack::store::RotamerLibrary;
use crate::core::models::pose::Pose;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Historical timing fit for the representation decision. The per-call
/// coefficients and offsets come from regressions of observed packing runs
/// against problem size; they are deliberately replaceable as hardware
/// drifts from the machines they were fit on.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    /// Seconds per neighbor energy recomputation in the linear-memory
    /// representation.
    pub linmem_secs_per_calc: f64,
    /// Fixed setup overhead of the linear-memory representation, seconds.
    pub linmem_offset: f64,
    /// Seconds per table entry when precomputing every edge table.
    pub precompute_secs_per_calc: f64,
    /// Fixed offset of the precomputation fit, seconds (negative: the fit
    /// crosses zero at a few million entries).
    pub precompute_offset: f64,
    /// Below this predicted precomputation time the answer is always the
    /// precomputed representation, no comparison made.
    pub small_problem_threshold_secs: f64,
    /// Expected optimizer substitutions per candidate rotamer.
    pub iterations_per_rotamer: f64,
    /// Advisory ceiling on precomputed table memory.
    pub memory_advisory_bytes: usize,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            linmem_secs_per_calc: 1.08567e-4,
            linmem_offset: 28.603,
            precompute_secs_per_calc: 9.39307e-7,
            precompute_offset: -11.041,
            small_problem_threshold_secs: 60.0,
            iterations_per_rotamer: 5.0,
            memory_advisory_bytes: 256 * 1024 * 1024,
        }
    }
}

impl CostModel {
    /// Total state-pair table entries across all edges.
    pub fn n_pair_calcs(sets: &RotamerSets, neighbors: &NeighborGraph) -> f64 {
        neighbors
            .edges()
            .iter()
            .map(|&(a, b)| (sets.n_rotamers(a) * sets.n_rotamers(b)) as f64)
            .sum()
    }

    /// Expected neighbor recomputations over a whole optimization run: one
    /// per graph neighbor per substitution.
    pub fn n_nbr_calcs(&self, sets: &RotamerSets, neighbors: &NeighborGraph) -> f64 {
        let n_nodes = sets.n_nodes().max(1) as f64;
        let substitutions = self.iterations_per_rotamer * sets.total_rotamers() as f64;
        let avg_degree = 2.0 * neighbors.n_edges() as f64 / n_nodes;
        substitutions * avg_degree
    }

    pub fn estimate_precompute_secs(&self, n_pair_calcs: f64, threads: usize) -> f64 {
        (n_pair_calcs * self.precompute_secs_per_calc + self.precompute_offset)
            / threads.max(1) as f64
    }

    pub fn estimate_linmem_secs(&self, n_nbr_calcs: f64) -> f64 {
        n_nbr_calcs * self.linmem_secs_per_calc + self.linmem_offset
    }

    pub fn estimate_precompute_bytes(n_pair_calcs: f64) -> usize {
        (n_pair_calcs * std::mem::size_of::<f64>() as f64) as usize
    }
}

/// Builds the interaction graph for one packing job: honors an explicit
/// representation request, otherwise compares predicted costs, then layers
/// whole-structure decorations and per-edge reweights on the result.
pub struct InteractionGraphFactory;

impl InteractionGraphFactory {
    pub fn create(
        pose: &Pose,
        task: &PackerTask,
        score: &ScoreFunction,
        library: &RotamerLibrary,
        sets: Arc<RotamerSets>,
        neighbors: &NeighborGraph,
        cost_model: &CostModel,
    ) -> Result<Box<dyn InteractionGraph>, PackError> {
        let one_body = Self::one_body_tables(pose, score, library, &sets);
        let evaluator = Arc::new(PackingEvaluator::new(sets.clone(), score.clone()));
        let edges = neighbors.edges();

        let mut decorations = score.active_decorations();
        if !task.design_any() {
            // Surface and hydrophobic-patch terms score sequence identity;
            // a repack-only task cannot change it.
            let before = decorations.len();
            decorations
                .retain(|term| !matches!(term, ScoreTerm::Surface | ScoreTerm::HPatch));
            if decorations.len() != before {
                debug!("Dropped sequence-level score terms from a repack-only task");
            }
        }
        if pose.is_symmetric() && !decorations.is_empty() {
            warn!(
                terms = ?decorations,
                "Whole-structure score terms are unavailable for symmetric poses; dropping them"
            );
            decorations.clear();
        }

        let representation = match task.ig_request() {
            IgRequest::Precomputed => Representation::Precomputed,
            IgRequest::Lazy => Representation::Lazy,
            IgRequest::DoubleLazy => Representation::DoubleLazy,
            IgRequest::LinearMemory => Representation::LinearMemory,
            IgRequest::Auto => Self::choose(task, &sets, neighbors, cost_model),
        };

        let mut graph: Box<dyn InteractionGraph> = match representation {
            Representation::Precomputed => {
                Box::new(PrecomputedGraph::new(one_body, edges, evaluator))
            }
            Representation::Lazy => Box::new(LazyGraph::new(one_body, edges, evaluator)),
            Representation::DoubleLazy => Box::new(DoubleLazyGraph::new(
                one_body,
                edges,
                evaluator,
                task.double_lazy_memory_limit(),
            )),
            Representation::LinearMemory => Box::new(LinearMemoryGraph::new(
                one_body,
                edges,
                evaluator,
                task.linmem_history_size(),
            )),
        };
        info!(representation = graph.name(), "Instantiated interaction graph");

        if !decorations.is_empty() {
            let evaluators: Vec<Box<dyn WholeStructureEvaluator>> = decorations
                .iter()
                .map(|term| -> Box<dyn WholeStructureEvaluator> {
                    let weight = score.weight(*term);
                    match term {
                        ScoreTerm::Surface => Box::new(SurfaceEvaluator::new(sets.clone(), weight)),
                        ScoreTerm::HPatch => Box::new(HPatchEvaluator::new(sets.clone(), weight)),
                        ScoreTerm::NpdHbond => {
                            Box::new(NpdHbondEvaluator::new(sets.clone(), weight))
                        }
                        _ => unreachable!("only whole-structure terms are decorations"),
                    }
                })
                .collect();
            graph = Box::new(MultiplexedGraph::new(graph, evaluators));
        }

        Self::apply_edge_reweights(task, &sets, graph.as_mut());
        Ok(graph)
    }

    fn one_body_tables(
        pose: &Pose,
        score: &ScoreFunction,
        library: &RotamerLibrary,
        sets: &RotamerSets,
    ) -> Vec<Vec<f64>> {
        (0..sets.n_nodes())
            .map(|node| {
                let residue = pose.residue(sets.resid(node));
                sets.rotamers(node)
                    .iter()
                    .map(|r| {
                        score.rotamer_energy(library, r.amino_acid, &residue.backbone, &r.chi)
                    })
                    .collect()
            })
            .collect()
    }

    /// The automatic decision: precompute when the problem is small or the
    /// timing fit degenerates, otherwise take whichever of precomputation
    /// and linear memory is predicted cheaper.
    fn choose(
        task: &PackerTask,
        sets: &RotamerSets,
        neighbors: &NeighborGraph,
        cost_model: &CostModel,
    ) -> Representation {
        let n_pair_calcs = CostModel::n_pair_calcs(sets, neighbors);
        let n_nbr_calcs = cost_model.n_nbr_calcs(sets, neighbors);
        let precompute_secs = cost_model.estimate_precompute_secs(n_pair_calcs, task.threads());
        let linmem_secs = cost_model.estimate_linmem_secs(n_nbr_calcs);
        debug!(
            n_pair_calcs,
            n_nbr_calcs, precompute_secs, linmem_secs, "Representation cost estimates"
        );

        let precompute = || {
            let bytes = CostModel::estimate_precompute_bytes(n_pair_calcs);
            if bytes > cost_model.memory_advisory_bytes {
                warn!(
                    bytes,
                    advisory = cost_model.memory_advisory_bytes,
                    "Precomputed tables exceed the memory advisory"
                );
            }
            Representation::Precomputed
        };

        if precompute_secs < cost_model.small_problem_threshold_secs {
            return precompute();
        }
        // A negative linear-memory estimate means the fit is being applied
        // outside its calibrated range; fall back to precomputation.
        if linmem_secs < 0.0 {
            return precompute();
        }
        if linmem_secs < precompute_secs {
            Representation::LinearMemory
        } else {
            precompute()
        }
    }

    fn apply_edge_reweights(task: &PackerTask, sets: &RotamerSets, graph: &mut dyn InteractionGraph) {
        for rw in task.edge_reweights() {
            let (Some(a), Some(b)) = (sets.molten(rw.lower), sets.molten(rw.upper)) else {
                debug!(
                    lower = rw.lower,
                    upper = rw.upper,
                    "Edge reweight names a position outside the candidate sets; ignored"
                );
                continue;
            };
            graph.set_edge_weight(a, b, rw.weight);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Representation {
    Precomputed,
    Lazy,
    DoubleLazy,
    LinearMemory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dunbrack::params::DunbrackParameterSet;
    use crate::core::dunbrack::store::{LibraryFamily, RotamerLibraryConfig};
    use crate::core::models::aa::AminoAcid;
    use crate::pack::task::PositionSpec;
    use crate::core::models::pose::PoseResidue;
    use nalgebra::Point3;
    use std::fmt::Write as _;
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture_library(dir: &Path) -> RotamerLibrary {
        let params = DunbrackParameterSet::dun02();
        let mut text = String::new();
        for spec in &params.rotameric {
            for (well, prob, mean) in [(1, 0.5, 62.0), (2, 0.3, -178.0), (3, 0.2, -65.0)] {
                write!(text, "{} -180.0 -180.0", spec.aa.three_letter()).unwrap();
                for _ in 0..spec.n_chi {
                    write!(text, " {well}").unwrap();
                }
                write!(text, " {prob}").unwrap();
                for _ in 0..spec.n_chi {
                    write!(text, " {mean}").unwrap();
                }
                for _ in 0..spec.n_chi {
                    write!(text, " 8.5").unwrap();
                }
                text.push('\n');
            }
        }
        let path = dir.join("dun02.lib");
        std::fs::write(&path, text).unwrap();
        RotamerLibrary::load(RotamerLibraryConfig::new(LibraryFamily::Legacy02 {
            ascii_file: path,
        }))
        .unwrap()
    }

    fn three_residue_pose(symmetric: bool) -> Pose {
        let residues = vec![
            PoseResidue::new(AminoAcid::Ser, vec![-60.0, -45.0], vec![55.0])
                .with_center(Point3::new(0.0, 0.0, 0.0)),
            PoseResidue::new(AminoAcid::Leu, vec![-120.0, 130.0], vec![175.0, 60.0])
                .with_center(Point3::new(6.0, 0.0, 0.0)),
            PoseResidue::new(AminoAcid::Val, vec![-70.0, -20.0], vec![-60.0])
                .with_center(Point3::new(12.0, 0.0, 0.0)),
        ];
        if symmetric {
            Pose::new_symmetric(residues)
        } else {
            Pose::new(residues)
        }
    }

    struct Setup {
        pose: Pose,
        task: PackerTask,
        score: ScoreFunction,
        library: RotamerLibrary,
        sets: Arc<RotamerSets>,
        neighbors: NeighborGraph,
    }

    fn setup(dir: &Path, symmetric: bool) -> Setup {
        let pose = three_residue_pose(symmetric);
        let task = PackerTask::repack_all(3);
        let score = ScoreFunction::default();
        let library = fixture_library(dir);
        let sets = Arc::new(RotamerSets::build(&pose, &task, &library).unwrap());
        let centers: Vec<_> = (0..sets.n_nodes())
            .map(|n| pose.residue(sets.resid(n)).center)
            .collect();
        let neighbors = NeighborGraph::from_centers(&centers, 10.0);
        Setup {
            pose,
            task,
            score,
            library,
            sets,
            neighbors,
        }
    }

    fn create(s: &Setup, cost_model: &CostModel) -> Box<dyn InteractionGraph> {
        InteractionGraphFactory::create(
            &s.pose,
            &s.task,
            &s.score,
            &s.library,
            s.sets.clone(),
            &s.neighbors,
            cost_model,
        )
        .unwrap()
    }

    #[test]
    fn small_problems_always_precompute() {
        let dir = TempDir::new().unwrap();
        let s = setup(dir.path(), false);
        let graph = create(&s, &CostModel::default());
        assert_eq!(graph.name(), "precomputed");
    }

    #[test]
    fn explicit_requests_bypass_the_cost_model() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        for (request, name) in [
            (IgRequest::Lazy, "lazy"),
            (IgRequest::DoubleLazy, "double-lazy"),
            (IgRequest::LinearMemory, "linear-memory"),
            (IgRequest::Precomputed, "precomputed"),
        ] {
            s.task.set_ig_request(request);
            let graph = create(&s, &CostModel::default());
            assert_eq!(graph.name(), name);
        }
    }

    #[test]
    fn expensive_precomputation_switches_to_linear_memory() {
        let dir = TempDir::new().unwrap();
        let s = setup(dir.path(), false);
        let cost_model = CostModel {
            // Make every table entry look ruinously slow and remove the
            // small-problem shortcut.
            precompute_secs_per_calc: 1.0e3,
            precompute_offset: 0.0,
            small_problem_threshold_secs: 0.0,
            linmem_secs_per_calc: 1.0e-9,
            linmem_offset: 0.1,
            ..CostModel::default()
        };
        let graph = create(&s, &cost_model);
        assert_eq!(graph.name(), "linear-memory");
    }

    #[test]
    fn negative_linmem_estimate_forces_precomputation() {
        let dir = TempDir::new().unwrap();
        let s = setup(dir.path(), false);
        let cost_model = CostModel {
            small_problem_threshold_secs: 0.0,
            linmem_secs_per_calc: 0.0,
            linmem_offset: -5.0,
            ..CostModel::default()
        };
        let graph = create(&s, &cost_model);
        assert_eq!(graph.name(), "precomputed");
    }

    #[test]
    fn decorations_wrap_the_graph_in_a_multiplexer() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        s.task
            .set_position(
                0,
                PositionSpec::Design(vec![AminoAcid::Ser, AminoAcid::Leu]),
            )
            .unwrap();
        s.sets = Arc::new(RotamerSets::build(&s.pose, &s.task, &s.library).unwrap());
        s.score.set_weight(ScoreTerm::HPatch, 0.5);
        let graph = create(&s, &CostModel::default());
        assert_eq!(graph.name(), "multiplexed");
    }

    #[test]
    fn repack_only_tasks_drop_sequence_level_decorations() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        s.score.set_weight(ScoreTerm::Surface, 0.5);
        s.score.set_weight(ScoreTerm::HPatch, 0.5);
        let graph = create(&s, &CostModel::default());
        assert_eq!(graph.name(), "precomputed");
    }

    #[test]
    fn hbond_decoration_survives_repack_only_tasks() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        s.score.set_weight(ScoreTerm::NpdHbond, 0.5);
        let graph = create(&s, &CostModel::default());
        assert_eq!(graph.name(), "multiplexed");
    }

    #[test]
    fn symmetric_poses_drop_decorations() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), true);
        s.score.set_weight(ScoreTerm::NpdHbond, 0.5);
        s.sets = Arc::new(RotamerSets::build(&s.pose, &s.task, &s.library).unwrap());
        let graph = create(&s, &CostModel::default());
        assert_eq!(graph.name(), "precomputed");
    }

    #[test]
    fn edge_reweights_scale_two_body_energies() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        let mut plain = create(&s, &CostModel::default());
        let unweighted = plain.two_body_energy(0, 0, 1, 0);

        s.task.add_edge_reweight(0, 1, 3.0).unwrap();
        let mut reweighted = create(&s, &CostModel::default());
        assert!((reweighted.two_body_energy(0, 0, 1, 0) - 3.0 * unweighted).abs() < 1e-12);
    }

    #[test]
    fn representations_agree_on_two_body_energies() {
        let dir = TempDir::new().unwrap();
        let mut s = setup(dir.path(), false);
        let mut graphs: Vec<Box<dyn InteractionGraph>> = Vec::new();
        for request in [
            IgRequest::Precomputed,
            IgRequest::Lazy,
            IgRequest::DoubleLazy,
            IgRequest::LinearMemory,
        ] {
            s.task.set_ig_request(request);
            graphs.push(create(&s, &CostModel::default()));
        }
        let edges = graphs[0].edges();
        for (a, b) in edges {
            for sa in 0..graphs[0].num_states(a) {
                for sb in 0..graphs[0].num_states(b) {
                    let reference = graphs[0].two_body_energy(a, sa, b, sb);
                    for g in graphs.iter_mut().skip(1) {
                        assert_eq!(g.two_body_energy(a, sa, b, sb), reference);
                    }
                }
            }
        }
    }
}
