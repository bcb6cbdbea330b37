//! Side-chain packing: candidate rotamer enumeration, pairwise energy
//! evaluation, and the interaction-graph representations the combinatorial
//! optimizer runs against.
//!
//! The flow is: a [`task::PackerTask`] declares which positions move, a
//! [`rotamer_sets::RotamerSets`] enumerates their candidate rotamers from
//! the statistical library, a [`neighbor::NeighborGraph`] decides which
//! position pairs interact, and [`factory::InteractionGraphFactory`] picks
//! and populates the graph representation whose predicted cost is lowest.

pub mod error;
pub mod factory;
pub mod graph;
pub mod neighbor;
pub mod rotamer_sets;
pub mod score;
pub mod task;
