use crate::cli::ValidateArgs;
use crate::error::{CliError, Result};
use rotapack::core::dunbrack::store::{RotamerLibrary, RotamerLibraryConfig};

/// Loads the library (binary cache preferred) and checks every amino
/// acid's statistics against a fresh ASCII read.
pub fn run(args: ValidateArgs) -> Result<()> {
    let config = RotamerLibraryConfig::from_toml_file(&args.config)?;
    let library = RotamerLibrary::load(config)?;
    if library.validate_against_ascii()? {
        println!("All libraries match their ASCII sources.");
        Ok(())
    } else {
        Err(CliError::ValidationFailed)
    }
}
