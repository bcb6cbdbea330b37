use crate::core::dunbrack::error::DunbrackError;
use crate::core::models::aa::AminoAcid;
use thiserror::Error;

/// Errors raised while preparing or running a packing job.
#[derive(Debug, Error)]
pub enum PackError {
    #[error(transparent)]
    Dunbrack(#[from] DunbrackError),

    #[error("Position {index} is out of range for a pose of {len} residues")]
    InvalidPosition { index: usize, len: usize },

    #[error("Task declares {task_len} positions but the pose has {pose_len} residues")]
    TaskSizeMismatch { task_len: usize, pose_len: usize },

    #[error("No packable positions; every residue is fixed")]
    NothingToPack,

    #[error("Design at position {index} allows no amino acids")]
    EmptyDesignPalette { index: usize },

    #[error("No rotamer candidates could be built for {aa} at position {index}")]
    NoCandidates { aa: AminoAcid, index: usize },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },
}
