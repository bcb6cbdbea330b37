//! End-to-end packing workflows: from a pose, a task, and a loaded rotamer
//! library to an interaction graph and an optimized assignment.

use crate::core::dunbrack::store::RotamerLibrary;
use crate::core::models::pose::Pose;
use crate::pack::error::PackError;
use crate::pack::factory::{CostModel, InteractionGraphFactory};
use crate::pack::graph::InteractionGraph;
use crate::pack::neighbor::NeighborGraph;
use crate::pack::rotamer_sets::RotamerSets;
use crate::pack::score::ScoreFunction;
use crate::pack::task::PackerTask;
use std::sync::Arc;
use tracing::{debug, info};

/// Extra neighbor-detection margin covering the displacement of candidate
/// interaction centers from their residue centers.
const NEIGHBOR_MARGIN: f64 = 3.0;

/// A prepared packing job: the candidate sets and the interaction graph the
/// optimizer runs against.
pub struct PackingJob {
    pub sets: Arc<RotamerSets>,
    pub neighbors: NeighborGraph,
    pub graph: Box<dyn InteractionGraph>,
}

/// Builds everything a packing run needs: candidate rotamers (one per fixed
/// position, many per packable one), the neighbor graph over all of them,
/// and the cost-model-selected interaction graph.
pub fn prepare_packing(
    pose: &Pose,
    task: &PackerTask,
    score: &ScoreFunction,
    library: &RotamerLibrary,
    cost_model: &CostModel,
) -> Result<PackingJob, PackError> {
    let sets = Arc::new(RotamerSets::build(pose, task, library)?);

    let centers: Vec<_> = (0..sets.n_nodes())
        .map(|node| pose.residue(sets.resid(node)).center)
        .collect();
    let neighbors =
        NeighborGraph::from_centers(&centers, score.interaction_cutoff() + NEIGHBOR_MARGIN);
    debug!(
        nodes = sets.n_nodes(),
        edges = neighbors.n_edges(),
        rotamers = sets.total_rotamers(),
        "Prepared packing problem"
    );

    let graph = InteractionGraphFactory::create(
        pose,
        task,
        score,
        library,
        sets.clone(),
        &neighbors,
        cost_model,
    )?;
    Ok(PackingJob {
        sets,
        neighbors,
        graph,
    })
}

/// Result of a packing run: the chosen state per node and its energy.
#[derive(Debug, Clone, PartialEq)]
pub struct PackingResult {
    pub assignment: Vec<usize>,
    pub energy: f64,
}

/// Deterministic steepest-descent optimization: starting from state zero
/// everywhere (the input conformation at repack positions), repeatedly
/// sweep all nodes, moving each to the state that most lowers its local
/// energy, until a full sweep changes nothing.
pub fn run_packing(job: &mut PackingJob) -> PackingResult {
    let graph = job.graph.as_mut();
    let n = graph.num_nodes();
    let mut assignment = vec![0usize; n];

    loop {
        let mut changed = false;
        for node in 0..n {
            let mut best_state = assignment[node];
            let mut best_energy = local_energy(graph, &job.neighbors, &assignment, node, best_state);
            for state in 0..graph.num_states(node) {
                if state == assignment[node] {
                    continue;
                }
                let e = local_energy(graph, &job.neighbors, &assignment, node, state);
                if e < best_energy {
                    best_energy = e;
                    best_state = state;
                }
            }
            if best_state != assignment[node] {
                assignment[node] = best_state;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let energy = graph.total_energy(&assignment);
    info!(energy, "Packing converged");
    PackingResult { assignment, energy }
}

/// One-body energy of a state plus its interactions with the currently
/// assigned neighbor states.
fn local_energy(
    graph: &mut dyn InteractionGraph,
    neighbors: &NeighborGraph,
    assignment: &[usize],
    node: usize,
    state: usize,
) -> f64 {
    let mut e = graph.one_body_energy(node, state);
    for &other in neighbors.neighbors(node) {
        e += graph.two_body_energy(node, state, other, assignment[other]);
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dunbrack::params::DunbrackParameterSet;
    use crate::core::dunbrack::store::{LibraryFamily, RotamerLibraryConfig};
    use crate::core::models::aa::AminoAcid;
    use crate::core::models::pose::PoseResidue;
    use crate::pack::task::{IgRequest, PositionSpec};
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

    fn three_residue_pose() -> Pose {
        Pose::new(vec![
            PoseResidue::new(AminoAcid::Ser, vec![-60.0, -45.0], vec![10.0])
                .with_center(Point3::new(0.0, 0.0, 0.0)),
            PoseResidue::new(AminoAcid::Leu, vec![-120.0, 130.0], vec![10.0, 10.0])
                .with_center(Point3::new(5.0, 0.0, 0.0)),
            PoseResidue::new(AminoAcid::Val, vec![-70.0, -20.0], vec![10.0])
                .with_center(Point3::new(10.0, 0.0, 0.0)),
        ])
    }

    #[test]
    fn end_to_end_packing_lowers_the_energy() {
        let dir = TempDir::new().unwrap();
        let library = fixture_library(dir.path());
        let pose = three_residue_pose();
        let task = PackerTask::repack_all(3);
        let score = ScoreFunction::default();

        let mut job =
            prepare_packing(&pose, &task, &score, &library, &CostModel::default()).unwrap();
        let start_energy = job.graph.total_energy(&vec![0; job.sets.n_nodes()]);
        let result = run_packing(&mut job);

        assert_eq!(result.assignment.len(), 3);
        assert!(result.energy <= start_energy);
        assert!((result.energy - job.graph.total_energy(&result.assignment)).abs() < 1e-9);
    }

    #[test]
    fn every_representation_packs_to_the_same_answer() {
        let dir = TempDir::new().unwrap();
        let library = fixture_library(dir.path());
        let pose = three_residue_pose();
        let score = ScoreFunction::default();

        let mut reference: Option<PackingResult> = None;
        for request in [
            IgRequest::Precomputed,
            IgRequest::Lazy,
            IgRequest::DoubleLazy,
            IgRequest::LinearMemory,
        ] {
            let mut task = PackerTask::repack_all(3);
            task.set_ig_request(request);
            let mut job =
                prepare_packing(&pose, &task, &score, &library, &CostModel::default()).unwrap();
            let result = run_packing(&mut job);
            match &reference {
                None => reference = Some(result),
                Some(r) => assert_eq!(&result, r),
            }
        }
    }

    #[test]
    fn fixed_positions_hold_one_rotamer_in_the_graph() {
        let dir = TempDir::new().unwrap();
        let library = fixture_library(dir.path());
        let pose = three_residue_pose();
        let mut task = PackerTask::repack_all(3);
        task.fix_position(1).unwrap();
        let score = ScoreFunction::default();

        let job = prepare_packing(&pose, &task, &score, &library, &CostModel::default()).unwrap();
        assert_eq!(job.graph.num_nodes(), 3);
        assert_eq!(job.graph.num_states(1), 1);
        assert!(job.sets.n_rotamers(0) > 1);
        assert!(job.neighbors.contains_edge(0, 1));
        assert!(job.neighbors.contains_edge(1, 2));
    }

    fn design_next_to_fixed_pose(gap: f64) -> Pose {
        Pose::new(vec![
            PoseResidue::new(AminoAcid::Ser, vec![-60.0, -45.0], vec![10.0])
                .with_center(Point3::new(0.0, 0.0, 0.0)),
            PoseResidue::new(AminoAcid::Val, vec![-120.0, 130.0], vec![175.0])
                .with_center(Point3::new(gap, 0.0, 0.0)),
        ])
    }

    fn pack_design_next_to_fixed(gap: f64, library: &RotamerLibrary) -> PackingResult {
        let pose = design_next_to_fixed_pose(gap);
        let mut task = PackerTask::repack_all(2);
        task.set_position(
            0,
            PositionSpec::Design(vec![AminoAcid::Ser, AminoAcid::Leu]),
        )
        .unwrap();
        task.fix_position(1).unwrap();
        let score = ScoreFunction::default();
        let mut job =
            prepare_packing(&pose, &task, &score, library, &CostModel::default()).unwrap();
        assert_eq!(job.graph.num_states(1), 1);
        run_packing(&mut job)
    }

    #[test]
    fn a_clashing_fixed_neighbor_raises_the_packed_energy() {
        let dir = TempDir::new().unwrap();
        let library = fixture_library(dir.path());

        let near = pack_design_next_to_fixed(1.5, &library);
        let far = pack_design_next_to_fixed(9.0, &library);
        assert_eq!(near.assignment.len(), 2);
        assert_eq!(near.assignment[1], 0);
        assert!(near.energy > far.energy + 1.0);
    }
}
