use super::error::PackError;
use super::task::{PackerTask, PositionSpec};
use crate::core::dunbrack::store::RotamerLibrary;
use crate::core::models::aa::AminoAcid;
use crate::core::models::pose::Pose;
use nalgebra::{Point3, Vector3};
use tracing::debug;

/// How far a candidate's interaction center is displaced from the residue
/// center along the direction implied by its leading torsions.
const TIP_DISPLACEMENT: f64 = 1.5;

/// One candidate side-chain placement at one packable position.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRotamer {
    pub amino_acid: AminoAcid,
    pub chi: Vec<f64>,
    pub center: Point3<f64>,
}

/// Interaction center of a candidate: the residue center displaced along a
/// unit direction derived from the first two torsions, so that different
/// rotamers of one residue occupy (deterministically) different space.
fn candidate_center(base: &Point3<f64>, chi: &[f64]) -> Point3<f64> {
    if chi.is_empty() {
        return *base;
    }
    let a = chi[0].to_radians();
    let b = chi.get(1).copied().unwrap_or(0.0).to_radians();
    let dir = Vector3::new(a.cos() * b.cos(), a.sin() * b.cos(), b.sin());
    base + dir * TIP_DISPLACEMENT
}

/// The candidate rotamers for every position in the problem, plus the index
/// maps between pose residue numbering and node numbering. Fixed positions
/// carry exactly one candidate, the input conformation, so their
/// interactions with packable neighbors stay in the energy model.
#[derive(Debug, Clone)]
pub struct RotamerSets {
    molten_to_resid: Vec<usize>,
    resid_to_molten: Vec<Option<usize>>,
    rotamers: Vec<Vec<CandidateRotamer>>,
    offsets: Vec<usize>,
}

impl RotamerSets {
    /// Enumerates candidates for every position. The input conformation is
    /// always candidate zero at repack positions, so a packing run can
    /// never do worse than the input; fixed positions hold only that one
    /// candidate.
    pub fn build(
        pose: &Pose,
        task: &PackerTask,
        library: &RotamerLibrary,
    ) -> Result<Self, PackError> {
        if task.len() != pose.len() {
            return Err(PackError::TaskSizeMismatch {
                task_len: task.len(),
                pose_len: pose.len(),
            });
        }

        if task.packable_positions().is_empty() {
            return Err(PackError::NothingToPack);
        }

        let mut resid_to_molten = vec![None; pose.len()];
        let mut rotamers = Vec::with_capacity(pose.len());

        for resid in 0..pose.len() {
            resid_to_molten[resid] = Some(resid);
            let residue = pose.residue(resid);

            let mut candidates = Vec::new();
            match task.position(resid) {
                PositionSpec::Fixed => {
                    candidates.push(CandidateRotamer {
                        amino_acid: residue.amino_acid,
                        chi: residue.chi.clone(),
                        center: candidate_center(&residue.center, &residue.chi),
                    });
                }
                PositionSpec::Repack => {
                    candidates.push(CandidateRotamer {
                        amino_acid: residue.amino_acid,
                        chi: residue.chi.clone(),
                        center: candidate_center(&residue.center, &residue.chi),
                    });
                    extend_from_library(
                        &mut candidates,
                        library,
                        residue.amino_acid,
                        &residue.backbone,
                        &residue.center,
                    );
                }
                PositionSpec::Design(palette) => {
                    for &aa in palette {
                        if aa == residue.amino_acid {
                            candidates.push(CandidateRotamer {
                                amino_acid: aa,
                                chi: residue.chi.clone(),
                                center: candidate_center(&residue.center, &residue.chi),
                            });
                        }
                        extend_from_library(
                            &mut candidates,
                            library,
                            aa,
                            &residue.backbone,
                            &residue.center,
                        );
                        // Amino acids without statistics still need one
                        // placement to be designable.
                        if library.get_library_by_aa(aa).is_none() && aa != residue.amino_acid {
                            candidates.push(CandidateRotamer {
                                amino_acid: aa,
                                chi: Vec::new(),
                                center: residue.center,
                            });
                        }
                    }
                }
            }

            if candidates.is_empty() {
                return Err(PackError::NoCandidates {
                    aa: residue.amino_acid,
                    index: resid,
                });
            }
            rotamers.push(candidates);
        }

        let mut offsets = Vec::with_capacity(rotamers.len());
        let mut running = 0;
        for set in &rotamers {
            offsets.push(running);
            running += set.len();
        }
        debug!(
            nodes = rotamers.len(),
            rotamers = running,
            "Built candidate rotamer sets"
        );

        Ok(Self {
            molten_to_resid: (0..pose.len()).collect(),
            resid_to_molten,
            rotamers,
            offsets,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.rotamers.len()
    }

    pub fn resid(&self, molten: usize) -> usize {
        self.molten_to_resid[molten]
    }

    pub fn molten(&self, resid: usize) -> Option<usize> {
        self.resid_to_molten.get(resid).copied().flatten()
    }

    pub fn rotamers(&self, molten: usize) -> &[CandidateRotamer] {
        &self.rotamers[molten]
    }

    pub fn n_rotamers(&self, molten: usize) -> usize {
        self.rotamers[molten].len()
    }

    pub fn rotamer(&self, molten: usize, state: usize) -> &CandidateRotamer {
        &self.rotamers[molten][state]
    }

    /// Offset of this node's rotamers in the global rotamer numbering.
    pub fn offset(&self, molten: usize) -> usize {
        self.offsets[molten]
    }

    pub fn total_rotamers(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
            + self.rotamers.last().map(Vec::len).unwrap_or(0)
    }
}

fn extend_from_library(
    candidates: &mut Vec<CandidateRotamer>,
    library: &RotamerLibrary,
    aa: AminoAcid,
    backbone: &[f64],
    base_center: &Point3<f64>,
) {
    if let Some(lib) = library.get_library_by_aa(aa) {
        for chi in lib.sample_chi_sets(backbone) {
            let center = candidate_center(base_center, &chi);
            candidates.push(CandidateRotamer {
                amino_acid: aa,
                chi,
                center,
            });
        }
    }
}
