use crate::cli::CacheArgs;
use crate::error::{CliError, Result};
use rotapack::core::dunbrack::store::{RotamerLibrary, RotamerLibraryConfig};
use tracing::info;

/// Loads the configured library from ASCII and writes its binary cache.
pub fn run(args: CacheArgs) -> Result<()> {
    let mut config = RotamerLibraryConfig::from_toml_file(&args.config)?;
    let cache = config.binary_cache.clone().ok_or_else(|| {
        CliError::InvalidInput(format!(
            "'{}' does not set binary_cache; nothing to build",
            args.config.display()
        ))
    })?;

    if args.force && cache.exists() {
        info!(path = %cache.display(), "Removing existing cache before rebuild");
        let mut perms = std::fs::metadata(&cache)?.permissions();
        perms.set_readonly(false);
        std::fs::set_permissions(&cache, perms)?;
        std::fs::remove_file(&cache)?;
    }

    // Load with the cache disabled so the ASCII path is authoritative,
    // then write the cache explicitly.
    config.binary_cache = None;
    let library = RotamerLibrary::load(config)?;
    library.write_binary_cache(&cache)?;
    println!(
        "Cached {} bytes of rotamer statistics at {}",
        library.memory_usage_in_bytes(),
        cache.display()
    );
    Ok(())
}
