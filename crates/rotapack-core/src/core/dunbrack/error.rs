use crate::core::models::aa::AminoAcid;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, caching, or registering rotamer libraries.
///
/// Variants in the "fatal configuration" taxonomy (duplicate registration,
/// unsupported dimensions, missing or truncated required data) indicate a
/// store that must not be used; callers are expected to terminate with the
/// message rather than continue with a partial statistical model.
#[derive(Debug, Error)]
pub enum DunbrackError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Unknown amino acid '{0}' found in library file")]
    UnknownAminoAcid(String),

    #[error("Rotamer library for {0} has already been registered")]
    DuplicateLibrary(AminoAcid),

    #[error(
        "Unsupported table dimensions for {aa}: {n_chi} chi angles x {n_bb} backbone angles \
         (supported range is 1..=5 for both)"
    )]
    UnsupportedDimensions {
        aa: AminoAcid,
        n_chi: usize,
        n_bb: usize,
    },

    #[error("Unexpected end of binary library data while reading {context}")]
    TruncatedBinary { context: &'static str },

    #[error("Malformed binary library data: {0}")]
    MalformedBinary(String),

    #[error("Expected {expected} libraries in '{path}' but read {found}")]
    LibraryCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error(
        "Rotamer table for {aa} lists inconsistent wells across backbone bins \
         (bin {bin} is missing well tuple {wells:?})"
    )]
    InconsistentWells {
        aa: AminoAcid,
        bin: usize,
        wells: Vec<u8>,
    },
}
