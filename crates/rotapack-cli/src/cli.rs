use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "rotapack - backbone-dependent rotamer libraries and side-chain packing.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or refresh the binary rotamer library cache from ASCII sources.
    Cache(CacheArgs),
    /// Check a binary rotamer library cache against its ASCII sources.
    Validate(ValidateArgs),
    /// Classify side-chain torsions into rotamer wells and report energies.
    Classify(ClassifyArgs),
}

/// Arguments for the `cache` subcommand.
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Path to the library configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Rewrite the cache even if an up-to-date one already exists.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the library configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,
}

/// Arguments for the `classify` subcommand.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Path to the library configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Amino acid three-letter code (e.g. SER).
    #[arg(short, long, required = true, value_name = "AAA")]
    pub amino_acid: String,

    /// Backbone torsions in degrees, repeated per dimension (phi, psi, ...).
    #[arg(
        short,
        long = "bb",
        required = true,
        value_name = "DEG",
        num_args(1..),
        allow_negative_numbers = true
    )]
    pub backbone: Vec<f64>,

    /// Side-chain torsions in degrees, one per chi.
    #[arg(
        short = 'x',
        long = "chi",
        required = true,
        value_name = "DEG",
        num_args(1..),
        allow_negative_numbers = true
    )]
    pub chi: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn classify_parses_repeated_torsions() {
        let cli = Cli::parse_from([
            "rotapack", "classify", "-c", "lib.toml", "-a", "LYS", "--bb", "-60.0", "-45.0",
            "--chi", "62.0", "180.0", "65.0", "-177.0",
        ]);
        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.amino_acid, "LYS");
                assert_eq!(args.backbone.len(), 2);
                assert_eq!(args.chi.len(), 4);
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["rotapack", "-q", "-v", "cache", "-c", "lib.toml"]);
        assert!(result.is_err());
    }
}
