//! # Core Module
//!
//! Fundamental building blocks for rotamer-based side-chain packing: the
//! canonical amino-acid model, minimal pose representation, and the
//! backbone-dependent rotamer statistics with their library store.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Amino acids, residues, and poses
//! - **Rotamer Statistics** ([`dunbrack`]) - Backbone-dependent probability tables,
//!   well classification, interpolation, and ASCII/binary library management

pub mod dunbrack;
pub mod models;
