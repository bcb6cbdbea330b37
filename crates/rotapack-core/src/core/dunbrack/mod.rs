//! # Backbone-Dependent Rotamer Statistics
//!
//! Statistical models of side-chain conformations conditioned on backbone
//! torsions, together with the process-wide library store that owns one
//! model per canonical amino acid.
//!
//! ## Overview
//!
//! Two library families coexist, selected by configuration: the legacy
//! single-file format ([`store::LibraryFamily::Legacy02`]) and the current
//! per-amino-acid directory format ([`store::LibraryFamily::Current10`]),
//! which additionally supports semi-rotameric amino acids (a continuous
//! terminal chi modeled by a density table). Both families are parsed from
//! ASCII and cached as versioned binary files whose structural preamble is
//! validated before being trusted; any mismatch falls back to ASCII.
//!
//! ## Key types
//!
//! - [`model::SingleResidueDunbrackLibrary`] - one amino acid's statistical model
//! - [`store::RotamerLibrary`] - the per-amino-acid aggregate with cache lifecycle
//! - [`wells::RotamerWellAssignment`] - discrete well classification of chi angles
//! - [`params::DunbrackParameterSet`] - the hard-coded structural parameter tables

pub mod binary;
pub mod error;
pub mod model;
pub mod params;
pub mod spline;
pub mod store;
pub mod wells;

/// Maximum number of side-chain torsions a statistical model may describe.
pub const MAX_CHI: usize = 5;

/// Maximum number of backbone-torsion dimensions a model grid may span.
pub const MAX_BB: usize = 5;

/// Probabilities below this floor are clamped before taking `-ln(p)`, so a
/// zero-probability table entry never produces an infinite energy.
pub const PROB_FLOOR: f64 = 1e-6;
