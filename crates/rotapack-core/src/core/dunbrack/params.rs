use super::error::DunbrackError;
use super::{MAX_BB, MAX_CHI};
use crate::core::models::aa::AminoAcid;

/// Structural parameters for one rotameric amino acid: how many chi angles
/// its table describes and how many backbone-torsion dimensions it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotamericParams {
    pub aa: AminoAcid,
    pub n_chi: usize,
    pub n_bb: usize,
}

/// Structural parameters for one semi-rotameric amino acid.
///
/// The terminal chi is modeled continuously; the flags and start angle are
/// part of the binary-cache preamble and must match these hard-coded values
/// exactly before a cache may be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemiRotamericParams {
    pub aa: AminoAcid,
    /// Number of discretely modeled chi angles (the terminal chi is extra).
    pub n_rotameric_chi: usize,
    pub n_bb: usize,
    /// Score the terminal chi independently of backbone context.
    pub scoring_bb_independent: bool,
    /// Sample the terminal chi independently of backbone context.
    pub sampling_bb_independent: bool,
    /// Terminal chi is two-fold symmetric (period 180 instead of 360).
    pub symmetric: bool,
    /// Left edge, in degrees, of the terminal-chi density range.
    pub start_angle: f64,
}

impl SemiRotamericParams {
    /// Angular period of the terminal chi density.
    pub fn period(&self) -> f64 {
        if self.symmetric { 180.0 } else { 360.0 }
    }
}

/// The hard-coded structural parameter tables for a library family.
///
/// Amino acids appear in canonical (discriminant) order; the store loads
/// libraries in exactly this order, and binary caches embed a copy of these
/// tables for structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DunbrackParameterSet {
    pub rotameric: Vec<RotamericParams>,
    pub semi_rotameric: Vec<SemiRotamericParams>,
}

impl DunbrackParameterSet {
    /// Parameters for the legacy single-file family: all eighteen amino
    /// acids with side-chain statistics are modeled as purely rotameric
    /// over a phi/psi grid.
    pub fn dun02() -> Self {
        use AminoAcid::*;
        let rotameric = [
            (Arg, 4),
            (Asn, 2),
            (Asp, 2),
            (Cys, 1),
            (Gln, 3),
            (Glu, 3),
            (His, 2),
            (Ile, 2),
            (Leu, 2),
            (Lys, 4),
            (Met, 3),
            (Phe, 2),
            (Pro, 3),
            (Ser, 1),
            (Thr, 1),
            (Trp, 2),
            (Tyr, 2),
            (Val, 1),
        ]
        .into_iter()
        .map(|(aa, n_chi)| RotamericParams { aa, n_chi, n_bb: 2 })
        .collect();

        Self {
            rotameric,
            semi_rotameric: Vec::new(),
        }
    }

    /// Parameters for the current per-amino-acid directory family: ten
    /// rotameric amino acids plus eight semi-rotameric ones whose terminal
    /// chi is modeled by a continuous density.
    pub fn dun10() -> Self {
        use AminoAcid::*;
        let rotameric = [
            (Arg, 4),
            (Cys, 1),
            (Ile, 2),
            (Leu, 2),
            (Lys, 4),
            (Met, 3),
            (Pro, 3),
            (Ser, 1),
            (Thr, 1),
            (Val, 1),
        ]
        .into_iter()
        .map(|(aa, n_chi)| RotamericParams { aa, n_chi, n_bb: 2 })
        .collect();

        let semi_rotameric = [
            (Asn, 1, false, -180.0),
            (Asp, 1, true, -90.0),
            (Gln, 2, false, -180.0),
            (Glu, 2, true, -90.0),
            (His, 1, false, -180.0),
            (Phe, 1, true, -90.0),
            (Trp, 1, false, -180.0),
            (Tyr, 1, true, -90.0),
        ]
        .into_iter()
        .map(
            |(aa, n_rotameric_chi, symmetric, start_angle)| SemiRotamericParams {
                aa,
                n_rotameric_chi,
                n_bb: 2,
                scoring_bb_independent: false,
                sampling_bb_independent: false,
                symmetric,
                start_angle,
            },
        )
        .collect();

        Self {
            rotameric,
            semi_rotameric,
        }
    }

    /// Expected total number of libraries for this family.
    pub fn n_libraries(&self) -> usize {
        self.rotameric.len() + self.semi_rotameric.len()
    }

    pub fn rotameric_for(&self, aa: AminoAcid) -> Option<&RotamericParams> {
        self.rotameric.iter().find(|p| p.aa == aa)
    }

    pub fn semi_rotameric_for(&self, aa: AminoAcid) -> Option<&SemiRotamericParams> {
        self.semi_rotameric.iter().find(|p| p.aa == aa)
    }
}

/// Rejects table dimensions outside the supported fixed range.
///
/// Raised immediately during library construction; an out-of-range count is
/// a fatal configuration error, never silently ignored.
pub fn check_dimensions(aa: AminoAcid, n_chi: usize, n_bb: usize) -> Result<(), DunbrackError> {
    if n_chi == 0 || n_chi > MAX_CHI || n_bb == 0 || n_bb > MAX_BB {
        return Err(DunbrackError::UnsupportedDimensions { aa, n_chi, n_bb });
    }
    Ok(())
}
