use rotapack::core::dunbrack::error::DunbrackError;
use rotapack::pack::error::PackError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rotamer library error: {0}")]
    Library(#[from] DunbrackError),

    #[error("Packing error: {0}")]
    Pack(#[from] PackError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Binary cache disagrees with its ASCII source")]
    ValidationFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
