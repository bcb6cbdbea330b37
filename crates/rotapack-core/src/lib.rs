//! # rotapack Core Library
//!
//! A library for combinatorial protein side-chain packing, built around
//! backbone-dependent rotamer statistics and interchangeable interaction-graph
//! representations.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`Pose`, `AminoAcid`)
//!   and the backbone-dependent rotamer statistics (`dunbrack`): per-amino-acid
//!   probability tables, well classification, interpolation, and the binary-cached
//!   library store.
//!
//! - **[`pack`]: The Logic Core.** This stateful layer holds the packing machinery:
//!   the packer task, candidate rotamer sets, the neighbor graph, the
//!   `InteractionGraph` trait with its dense, lazy, double-lazy, and linear-memory
//!   implementations, and the cost-model-driven factory that selects and populates
//!   a graph for a packing run.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing layer.
//!   It ties the `pack` and `core` layers together to produce a fully populated
//!   interaction graph that an external annealer can search.

pub mod core;
pub mod pack;
pub mod workflows;
