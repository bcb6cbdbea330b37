use super::aa::AminoAcid;
use nalgebra::Point3;

/// A single residue as seen by the packing subsystem: identity, torsion
/// state, and a representative interaction center used for neighbor
/// detection and the pairwise energy model.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseResidue {
    pub amino_acid: AminoAcid,
    /// Backbone torsions in degrees (phi, psi, ... up to five dimensions).
    pub backbone: Vec<f64>,
    /// Side-chain torsions in degrees, one per rotatable chi.
    pub chi: Vec<f64>,
    /// Representative side-chain interaction center.
    pub center: Point3<f64>,
}

impl PoseResidue {
    pub fn new(amino_acid: AminoAcid, backbone: Vec<f64>, chi: Vec<f64>) -> Self {
        Self {
            amino_acid,
            backbone,
            chi,
            center: Point3::origin(),
        }
    }

    pub fn with_center(mut self, center: Point3<f64>) -> Self {
        self.center = center;
        self
    }
}

/// A minimal pose: an ordered list of residues plus a symmetry marker.
///
/// Symmetric poses restrict which interaction-graph decorations are
/// available; the factory consults [`Pose::is_symmetric`] when selecting a
/// graph representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    residues: Vec<PoseResidue>,
    symmetric: bool,
}

impl Pose {
    pub fn new(residues: Vec<PoseResidue>) -> Self {
        Self {
            residues,
            symmetric: false,
        }
    }

    pub fn new_symmetric(residues: Vec<PoseResidue>) -> Self {
        Self {
            residues,
            symmetric: true,
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn residue(&self, index: usize) -> &PoseResidue {
        &self.residues[index]
    }

    pub fn residues(&self) -> &[PoseResidue] {
        &self.residues
    }
}
