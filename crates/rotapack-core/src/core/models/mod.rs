//! Minimal molecular data model consumed by the rotamer statistics and the
//! packing machinery: canonical amino acids and torsion-level residue state.

pub mod aa;
pub mod pose;
