use crate::core::dunbrack::store::RotamerLibrary;
use crate::core::models::aa::AminoAcid;
use nalgebra::Point3;

/// The energy terms the packer knows how to weight.
///
/// `PairPotential` and `DunbrackRotamer` decompose onto graph nodes and
/// edges; the remaining terms are whole-structure decorations evaluated by
/// a multiplexed graph over complete assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTerm {
    PairPotential,
    DunbrackRotamer,
    Surface,
    HPatch,
    NpdHbond,
}

impl ScoreTerm {
    pub const ALL: [ScoreTerm; 5] = [
        ScoreTerm::PairPotential,
        ScoreTerm::DunbrackRotamer,
        ScoreTerm::Surface,
        ScoreTerm::HPatch,
        ScoreTerm::NpdHbond,
    ];

    fn slot(self) -> usize {
        match self {
            ScoreTerm::PairPotential => 0,
            ScoreTerm::DunbrackRotamer => 1,
            ScoreTerm::Surface => 2,
            ScoreTerm::HPatch => 3,
            ScoreTerm::NpdHbond => 4,
        }
    }
}

/// Weighted combination of the packer's energy terms, plus the geometric
/// parameters of the pairwise potential.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFunction {
    weights: [f64; 5],
    /// Pairwise well depth.
    epsilon: f64,
    /// Pairwise zero-crossing distance, in Angstroms.
    sigma: f64,
    /// Distance beyond which two positions do not interact.
    cutoff: f64,
}

impl Default for ScoreFunction {
    fn default() -> Self {
        let mut weights = [0.0; 5];
        weights[ScoreTerm::PairPotential.slot()] = 1.0;
        weights[ScoreTerm::DunbrackRotamer.slot()] = 0.56;
        Self {
            weights,
            epsilon: 0.2,
            sigma: 4.0,
            cutoff: 10.0,
        }
    }
}

impl ScoreFunction {
    pub fn weight(&self, term: ScoreTerm) -> f64 {
        self.weights[term.slot()]
    }

    pub fn set_weight(&mut self, term: ScoreTerm, weight: f64) -> &mut Self {
        self.weights[term.slot()] = weight;
        self
    }

    /// Whole-structure terms with a nonzero weight, in evaluation order.
    pub fn active_decorations(&self) -> Vec<ScoreTerm> {
        [ScoreTerm::Surface, ScoreTerm::HPatch, ScoreTerm::NpdHbond]
            .into_iter()
            .filter(|t| self.weight(*t) != 0.0)
            .collect()
    }

    pub fn interaction_cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Truncated 12-6 potential between two interaction centers, weighted.
    /// Distances below one Angstrom are clamped so a degenerate pair of
    /// centers yields a large finite clash instead of an infinity.
    pub fn pair_energy(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        let w = self.weight(ScoreTerm::PairPotential);
        if w == 0.0 {
            return 0.0;
        }
        let r = (a - b).norm().max(1.0);
        if r > self.cutoff {
            return 0.0;
        }
        let s = (self.sigma / r).powi(6);
        w * 4.0 * self.epsilon * (s * s - s)
    }

    /// Statistical one-body energy of a candidate conformation. Amino acids
    /// without library statistics contribute zero.
    pub fn rotamer_energy(
        &self,
        library: &RotamerLibrary,
        aa: AminoAcid,
        backbone: &[f64],
        chi: &[f64],
    ) -> f64 {
        let w = self.weight(ScoreTerm::DunbrackRotamer);
        if w == 0.0 {
            return 0.0;
        }
        match library.get_library_by_aa(aa) {
            Some(lib) => w * lib.rotamer_energy(backbone, chi).value,
            None => 0.0,
        }
    }
}

/// Side chains treated as hydrophobic by the patch decoration.
pub fn is_hydrophobic(aa: AminoAcid) -> bool {
    use AminoAcid::*;
    matches!(aa, Ala | Ile | Leu | Met | Phe | Pro | Trp | Val)
}

/// Side chains that can donate or accept a hydrogen bond.
pub fn is_polar(aa: AminoAcid) -> bool {
    use AminoAcid::*;
    matches!(
        aa,
        Arg | Asn | Asp | Gln | Glu | His | Lys | Ser | Thr | Trp | Tyr
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_activate_node_and_edge_terms_only() {
        let sf = ScoreFunction::default();
        assert_eq!(sf.weight(ScoreTerm::PairPotential), 1.0);
        assert!(sf.weight(ScoreTerm::DunbrackRotamer) > 0.0);
        assert!(sf.active_decorations().is_empty());
    }

    #[test]
    fn decorations_activate_with_nonzero_weights() {
        let mut sf = ScoreFunction::default();
        sf.set_weight(ScoreTerm::HPatch, 0.5);
        sf.set_weight(ScoreTerm::Surface, 0.25);
        assert_eq!(
            sf.active_decorations(),
            vec![ScoreTerm::Surface, ScoreTerm::HPatch]
        );
    }

    #[test]
    fn pair_energy_is_zero_past_the_cutoff() {
        let sf = ScoreFunction::default();
        let a = Point3::origin();
        let far = Point3::new(sf.interaction_cutoff() + 0.1, 0.0, 0.0);
        assert_eq!(sf.pair_energy(&a, &far), 0.0);
    }

    #[test]
    fn pair_energy_penalizes_clashes_and_rewards_contact() {
        let sf = ScoreFunction::default();
        let a = Point3::origin();
        let clash = Point3::new(2.0, 0.0, 0.0);
        let contact = Point3::new(4.5, 0.0, 0.0);
        assert!(sf.pair_energy(&a, &clash) > 0.0);
        assert!(sf.pair_energy(&a, &contact) < 0.0);
        // Finite even for coincident centers.
        assert!(sf.pair_energy(&a, &a).is_finite());
    }

    #[test]
    fn hydrophobicity_and_polarity_partition_sensibly() {
        assert!(is_hydrophobic(AminoAcid::Leu));
        assert!(!is_hydrophobic(AminoAcid::Lys));
        assert!(is_polar(AminoAcid::Ser));
        assert!(!is_polar(AminoAcid::Val));
    }
}
