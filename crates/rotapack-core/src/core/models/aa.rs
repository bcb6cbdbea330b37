use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The twenty canonical amino acids, in alphabetical three-letter-code order.
///
/// The discriminant is stable and doubles as the 32-bit amino-acid identifier
/// written into binary library caches, so variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AminoAcid {
    Ala = 0,
    Arg = 1,
    Asn = 2,
    Asp = 3,
    Cys = 4,
    Gln = 5,
    Glu = 6,
    Gly = 7,
    His = 8,
    Ile = 9,
    Leu = 10,
    Lys = 11,
    Met = 12,
    Phe = 13,
    Pro = 14,
    Ser = 15,
    Thr = 16,
    Trp = 17,
    Tyr = 18,
    Val = 19,
}

static THREE_LETTER_CODES: Map<&'static str, AminoAcid> = phf_map! {
    "ALA" => AminoAcid::Ala,
    "ARG" => AminoAcid::Arg,
    "ASN" => AminoAcid::Asn,
    "ASP" => AminoAcid::Asp,
    "CYS" => AminoAcid::Cys,
    "GLN" => AminoAcid::Gln,
    "GLU" => AminoAcid::Glu,
    "GLY" => AminoAcid::Gly,
    "HIS" => AminoAcid::His,
    "ILE" => AminoAcid::Ile,
    "LEU" => AminoAcid::Leu,
    "LYS" => AminoAcid::Lys,
    "MET" => AminoAcid::Met,
    "PHE" => AminoAcid::Phe,
    "PRO" => AminoAcid::Pro,
    "SER" => AminoAcid::Ser,
    "THR" => AminoAcid::Thr,
    "TRP" => AminoAcid::Trp,
    "TYR" => AminoAcid::Tyr,
    "VAL" => AminoAcid::Val,
};

/// Indicates that a string could not be mapped to a canonical amino acid.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("Unknown amino acid code '{0}'")]
pub struct UnknownAminoAcid(pub String);

impl AminoAcid {
    /// All canonical amino acids, in discriminant order.
    pub const ALL: [AminoAcid; 20] = [
        AminoAcid::Ala,
        AminoAcid::Arg,
        AminoAcid::Asn,
        AminoAcid::Asp,
        AminoAcid::Cys,
        AminoAcid::Gln,
        AminoAcid::Glu,
        AminoAcid::Gly,
        AminoAcid::His,
        AminoAcid::Ile,
        AminoAcid::Leu,
        AminoAcid::Lys,
        AminoAcid::Met,
        AminoAcid::Phe,
        AminoAcid::Pro,
        AminoAcid::Ser,
        AminoAcid::Thr,
        AminoAcid::Trp,
        AminoAcid::Tyr,
        AminoAcid::Val,
    ];

    /// Number of canonical amino acids; the fixed size of the library store.
    pub const COUNT: usize = 20;

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Maps a stable discriminant (e.g. from a binary cache) back to the enum.
    pub fn from_code(code: u8) -> Option<AminoAcid> {
        AminoAcid::ALL.get(code as usize).copied()
    }

    pub fn three_letter(self) -> &'static str {
        match self {
            AminoAcid::Ala => "ALA",
            AminoAcid::Arg => "ARG",
            AminoAcid::Asn => "ASN",
            AminoAcid::Asp => "ASP",
            AminoAcid::Cys => "CYS",
            AminoAcid::Gln => "GLN",
            AminoAcid::Glu => "GLU",
            AminoAcid::Gly => "GLY",
            AminoAcid::His => "HIS",
            AminoAcid::Ile => "ILE",
            AminoAcid::Leu => "LEU",
            AminoAcid::Lys => "LYS",
            AminoAcid::Met => "MET",
            AminoAcid::Phe => "PHE",
            AminoAcid::Pro => "PRO",
            AminoAcid::Ser => "SER",
            AminoAcid::Thr => "THR",
            AminoAcid::Trp => "TRP",
            AminoAcid::Tyr => "TYR",
            AminoAcid::Val => "VAL",
        }
    }
}

impl fmt::Display for AminoAcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.three_letter())
    }
}

impl FromStr for AminoAcid {
    type Err = UnknownAminoAcid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        THREE_LETTER_CODES
            .get(s.to_ascii_uppercase().as_str())
            .copied()
            .ok_or_else(|| UnknownAminoAcid(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_for_every_amino_acid() {
        for aa in AminoAcid::ALL {
            assert_eq!(AminoAcid::from_code(aa.code()), Some(aa));
        }
    }

    #[test]
    fn three_letter_round_trips_case_insensitively() {
        for aa in AminoAcid::ALL {
            assert_eq!(aa.three_letter().parse::<AminoAcid>(), Ok(aa));
            assert_eq!(
                aa.three_letter().to_lowercase().parse::<AminoAcid>(),
                Ok(aa)
            );
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!("XYZ".parse::<AminoAcid>().is_err());
        assert!(AminoAcid::from_code(20).is_none());
    }
}
