use crate::cli::ClassifyArgs;
use crate::error::{CliError, Result};
use rotapack::core::dunbrack::store::{RotamerLibrary, RotamerLibraryConfig};
use rotapack::core::models::aa::AminoAcid;

/// Classifies the given torsions into rotamer wells and reports the
/// statistical energy at the given backbone context.
pub fn run(args: ClassifyArgs) -> Result<()> {
    let aa: AminoAcid = args
        .amino_acid
        .parse()
        .map_err(|e| CliError::InvalidInput(format!("{e}")))?;

    let config = RotamerLibraryConfig::from_toml_file(&args.config)?;
    let library = RotamerLibrary::load(config)?;
    let lib = library.get_library_by_aa(aa).ok_or_else(|| {
        CliError::InvalidInput(format!("{aa} carries no statistics in this library family"))
    })?;

    if args.chi.len() != lib.n_chi() {
        return Err(CliError::InvalidInput(format!(
            "{aa} has {} chi angles, {} given",
            lib.n_chi(),
            args.chi.len()
        )));
    }

    let wells = lib.classify_wells(&args.backbone, &args.chi);
    let energy = lib.rotamer_energy(&args.backbone, &args.chi);
    println!("{aa} wells: {:?}", wells.wells());
    println!("energy: {:.4}", energy.value);
    Ok(())
}
