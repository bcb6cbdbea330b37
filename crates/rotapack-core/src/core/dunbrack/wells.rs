use super::MAX_CHI;
use crate::core::models::aa::AminoAcid;

/// Reduces an angle in degrees to the half-open range [-180, 180).
pub fn periodic_range(angle: f64) -> f64 {
    let reduced = angle.rem_euclid(360.0);
    if reduced >= 180.0 { reduced - 360.0 } else { reduced }
}

/// Discrete rotamer-well classification of a residue's side-chain torsions.
///
/// One entry per chi angle, up to [`MAX_CHI`]; a value of zero marks a
/// torsion with no defined well (extra chis, or amino acids without
/// statistics for that torsion index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotamerWellAssignment {
    wells: [u8; MAX_CHI],
    n_chi: usize,
}

impl RotamerWellAssignment {
    pub fn new(wells: [u8; MAX_CHI], n_chi: usize) -> Self {
        debug_assert!(n_chi <= MAX_CHI);
        Self { wells, n_chi }
    }

    pub fn from_slice(wells: &[u8]) -> Self {
        let mut buf = [0u8; MAX_CHI];
        let n = wells.len().min(MAX_CHI);
        buf[..n].copy_from_slice(&wells[..n]);
        Self { wells: buf, n_chi: n }
    }

    pub fn n_chi(&self) -> usize {
        self.n_chi
    }

    pub fn well(&self, chi_index: usize) -> u8 {
        self.wells[chi_index]
    }

    pub fn wells(&self) -> &[u8] {
        &self.wells[..self.n_chi]
    }
}

/// Classifies chi angles into the legacy fixed rotamer wells.
///
/// This is the hand-tuned decision table for the canonical amino acids.
/// Every comparison ladder ends in an unconditional else so that floating
/// point edge cases (e.g. `!(x >= 120.0) && !(x < 120.0)` for a NaN-free
/// boundary value) can never leave a torsion in range unassigned. Torsion
/// indices past an amino acid's statistical chi count are assigned zero.
pub fn classify_wells_02(aa: AminoAcid, chi: &[f64]) -> RotamerWellAssignment {
    use AminoAcid::*;

    let n_chi = chi.len().min(MAX_CHI);
    let mut rot = [0u8; MAX_CHI];

    for i in 0..n_chi {
        let x = periodic_range(chi[i]);
        rot[i] = match i {
            // chi 1
            0 => match aa {
                Pro => {
                    if x >= 0.0 {
                        1
                    } else {
                        2
                    }
                }
                Gly | Ala => 0,
                _ => {
                    if (0.0..=120.0).contains(&x) {
                        1
                    } else if x.abs() >= 120.0 {
                        2
                    } else {
                        3
                    }
                }
            },
            // chi 2
            1 => match aa {
                Arg | Glu | His | Ile | Lys | Leu | Met | Gln => {
                    if (0.0..=120.0).contains(&x) {
                        1
                    } else if x.abs() >= 120.0 {
                        2
                    } else {
                        3
                    }
                }
                Asp => {
                    if ((30.0..=90.0).contains(&x)) || ((-150.0..=-90.0).contains(&x)) {
                        1
                    } else if ((-30.0..=30.0).contains(&x)) || x.abs() >= 150.0 {
                        2
                    } else {
                        3
                    }
                }
                Phe | Tyr => {
                    if ((30.0..=150.0).contains(&x)) || ((-150.0..=-30.0).contains(&x)) {
                        1
                    } else {
                        2
                    }
                }
                Trp => {
                    if x <= -60.0 {
                        1
                    } else if x <= 60.0 {
                        2
                    } else {
                        3
                    }
                }
                // Conditional wells: asparagine chi2 boundaries depend on
                // the chi1 well assigned above.
                Asn => match rot[0] {
                    1 => {
                        if (-150.0..-90.0).contains(&x) {
                            1
                        } else if (-90.0..-30.0).contains(&x) {
                            2
                        } else if (-30.0..30.0).contains(&x) {
                            3
                        } else if (30.0..90.0).contains(&x) {
                            4
                        } else if (90.0..150.0).contains(&x) {
                            5
                        } else {
                            6
                        }
                    }
                    2 => {
                        if x < -90.0 {
                            1
                        } else if x < -45.0 {
                            2
                        } else if x < 0.0 {
                            3
                        } else if x < 45.0 {
                            4
                        } else if x < 90.0 {
                            5
                        } else {
                            6
                        }
                    }
                    _ => {
                        if x < -105.0 {
                            1
                        } else if x < -45.0 {
                            2
                        } else if x < 15.0 {
                            3
                        } else if x < 60.0 {
                            4
                        } else if x < 120.0 {
                            5
                        } else {
                            6
                        }
                    }
                },
                // Proline has only two rotamers, distinguished by chi1.
                Pro => 1,
                _ => 0,
            },
            // chi 3
            2 => match aa {
                Glu => {
                    if ((30.0..=90.0).contains(&x)) || ((-150.0..=-90.0).contains(&x)) {
                        1
                    } else if ((-30.0..=30.0).contains(&x)) || x.abs() >= 150.0 {
                        2
                    } else {
                        3
                    }
                }
                Arg | Lys | Met => {
                    if (0.0..=120.0).contains(&x) {
                        1
                    } else if x.abs() > 120.0 {
                        2
                    } else {
                        3
                    }
                }
                // Glutamine chi3 boundaries depend on the chi2 well.
                Gln => {
                    if rot[1] == 2 {
                        if x >= 135.0 || x < -135.0 {
                            1
                        } else if x < -45.0 {
                            2
                        } else if x < 45.0 {
                            3
                        } else {
                            4
                        }
                    } else if x < -90.0 {
                        1
                    } else if x < 0.0 {
                        2
                    } else if x < 90.0 {
                        3
                    } else {
                        4
                    }
                }
                Pro => 1,
                _ => 0,
            },
            // chi 4
            3 => match aa {
                Arg | Lys => {
                    if (0.0..=120.0).contains(&x) {
                        1
                    } else if x.abs() > 120.0 {
                        2
                    } else {
                        3
                    }
                }
                _ => 0,
            },
            _ => 0,
        };
    }

    RotamerWellAssignment::new(rot, n_chi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_range_reduces_into_half_open_interval() {
        assert!((periodic_range(190.0) - (-170.0)).abs() < 1e-12);
        assert!((periodic_range(-190.0) - 170.0).abs() < 1e-12);
        assert!((periodic_range(360.0)).abs() < 1e-12);
        assert_eq!(periodic_range(180.0), -180.0);
        assert_eq!(periodic_range(-180.0), -180.0);
    }

    #[test]
    fn chi1_three_well_classification() {
        let a = classify_wells_02(AminoAcid::Ser, &[60.0]);
        assert_eq!(a.wells(), &[1]);
        let a = classify_wells_02(AminoAcid::Ser, &[180.0]);
        assert_eq!(a.wells(), &[2]);
        let a = classify_wells_02(AminoAcid::Ser, &[-60.0]);
        assert_eq!(a.wells(), &[3]);
    }

    #[test]
    fn classification_is_periodic_in_chi() {
        for k in [-2i32, -1, 1, 3] {
            let shift = 360.0 * f64::from(k);
            for base in [-170.0, -60.0, 0.0, 59.9, 120.0, 175.0] {
                let direct = classify_wells_02(AminoAcid::Lys, &[base, base, base, base]);
                let shifted = classify_wells_02(
                    AminoAcid::Lys,
                    &[base + shift, base + shift, base + shift, base + shift],
                );
                assert_eq!(direct, shifted, "chi = {base} + {shift}");
            }
        }
    }

    #[test]
    fn glycine_and_alanine_get_no_wells() {
        assert_eq!(classify_wells_02(AminoAcid::Gly, &[55.0]).wells(), &[0]);
        assert_eq!(classify_wells_02(AminoAcid::Ala, &[55.0]).wells(), &[0]);
    }

    #[test]
    fn proline_chi2_and_chi3_are_pinned_to_well_one() {
        let a = classify_wells_02(AminoAcid::Pro, &[25.0, -40.0, 100.0]);
        assert_eq!(a.wells(), &[1, 1, 1]);
        let a = classify_wells_02(AminoAcid::Pro, &[-25.0, -40.0, 100.0]);
        assert_eq!(a.wells(), &[2, 1, 1]);
    }

    #[test]
    fn asparagine_chi2_wells_depend_on_chi1() {
        // Same chi2 value lands in different wells under different chi1 wells.
        let under_rot1 = classify_wells_02(AminoAcid::Asn, &[60.0, -100.0]);
        let under_rot2 = classify_wells_02(AminoAcid::Asn, &[180.0, -100.0]);
        assert_eq!(under_rot1.well(1), 1);
        assert_eq!(under_rot2.well(1), 1);
        let under_rot1 = classify_wells_02(AminoAcid::Asn, &[60.0, -50.0]);
        let under_rot2 = classify_wells_02(AminoAcid::Asn, &[180.0, -50.0]);
        assert_eq!(under_rot1.well(1), 2);
        assert_eq!(under_rot2.well(1), 3);
    }

    #[test]
    fn glutamine_chi3_wells_depend_on_chi2() {
        let under_rot2 = classify_wells_02(AminoAcid::Gln, &[60.0, 180.0, 170.0]);
        assert_eq!(under_rot2.well(1), 2);
        assert_eq!(under_rot2.well(2), 1);
        let other = classify_wells_02(AminoAcid::Gln, &[60.0, 60.0, 170.0]);
        assert_eq!(other.well(1), 1);
        assert_eq!(other.well(2), 4);
    }

    #[test]
    fn every_in_range_torsion_receives_a_well() {
        // Sweep boundaries; no torsion with statistics may stay unassigned.
        let mut chi = -180.0;
        while chi <= 180.0 {
            for aa in [
                AminoAcid::Arg,
                AminoAcid::Asp,
                AminoAcid::Asn,
                AminoAcid::Gln,
                AminoAcid::Phe,
                AminoAcid::Trp,
            ] {
                let a = classify_wells_02(aa, &[chi, chi]);
                assert_ne!(a.well(0), 0, "{aa} chi1 = {chi}");
                assert_ne!(a.well(1), 0, "{aa} chi2 = {chi}");
            }
            chi += 7.5;
        }
    }

    #[test]
    fn torsions_past_the_statistical_count_are_zero() {
        let a = classify_wells_02(AminoAcid::Ser, &[60.0, 60.0, 60.0]);
        assert_eq!(a.wells(), &[1, 0, 0]);
    }
}
