//! The per-amino-acid library store and its two load paths.
//!
//! A [`RotamerLibrary`] is populated either from the canonical ASCII source
//! files of a [`LibraryFamily`] or, when a trusted binary cache exists, from
//! that cache. Trust is decided by a structural preamble embedded in the
//! cache: format version, library count, and one parameter record per
//! library, all of which must match the hard-coded parameter set of the
//! family before a single payload byte is interpreted. Anything else falls
//! back to the ASCII path, which optionally rewrites the cache atomically.

use super::binary::{read_count, read_f64, read_i32, write_f64, write_i32};
use super::error::DunbrackError;
use super::model::{
    BackboneGrid, NrchiWell, RotamerRecord, RotamericModel, SemiRotamericModel,
    SingleResidueDunbrackLibrary, WellClassifier,
};
use super::params::{DunbrackParameterSet, RotamericParams, SemiRotamericParams};
use super::{MAX_CHI, PROB_FLOOR};
use crate::core::models::aa::AminoAcid;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Cache format version for the legacy single-file family.
pub const LEGACY02_BINARY_VERSION: i32 = 26;
/// Cache format version for the per-amino-acid directory family.
pub const CURRENT10_BINARY_VERSION: i32 = 1;

/// Which statistical library family to load, and where its ASCII source
/// lives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum LibraryFamily {
    /// One ASCII file holding every amino acid's table in sequence.
    Legacy02 { ascii_file: PathBuf },
    /// A directory of per-amino-acid files (`<aaa>.bbdep.rotamers.lib`,
    /// plus density and well-definition files for semi-rotameric residues).
    Current10 { ascii_dir: PathBuf },
}

impl LibraryFamily {
    pub fn parameter_set(&self) -> DunbrackParameterSet {
        match self {
            LibraryFamily::Legacy02 { .. } => DunbrackParameterSet::dun02(),
            LibraryFamily::Current10 { .. } => DunbrackParameterSet::dun10(),
        }
    }

    fn binary_version(&self) -> i32 {
        match self {
            LibraryFamily::Legacy02 { .. } => LEGACY02_BINARY_VERSION,
            LibraryFamily::Current10 { .. } => CURRENT10_BINARY_VERSION,
        }
    }

    fn classifier(&self) -> WellClassifier {
        match self {
            LibraryFamily::Legacy02 { .. } => WellClassifier::Legacy02,
            LibraryFamily::Current10 { .. } => WellClassifier::NearestMean,
        }
    }
}

/// How to load a [`RotamerLibrary`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RotamerLibraryConfig {
    #[serde(flatten)]
    pub family: LibraryFamily,
    /// Binary cache file; `None` disables the cache entirely.
    #[serde(default)]
    pub binary_cache: Option<PathBuf>,
    /// Load from ASCII without rewriting a missing or stale cache.
    #[serde(default)]
    pub dont_rewrite_cache: bool,
    /// Interpolate `-ln(p)` bicubically over two-dimensional backbone grids.
    #[serde(default = "default_use_bicubic")]
    pub use_bicubic: bool,
}

fn default_use_bicubic() -> bool {
    true
}

impl RotamerLibraryConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, DunbrackError> {
        let text = std::fs::read_to_string(path).map_err(|source| DunbrackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| DunbrackError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })
    }
    pub fn new(family: LibraryFamily) -> Self {
        Self {
            family,
            binary_cache: None,
            dont_rewrite_cache: false,
            use_bicubic: true,
        }
    }

    pub fn with_binary_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_cache = Some(path.into());
        self
    }

    pub fn without_cache_rewrite(mut self) -> Self {
        self.dont_rewrite_cache = true;
        self
    }

    pub fn with_bicubic(mut self, use_bicubic: bool) -> Self {
        self.use_bicubic = use_bicubic;
        self
    }
}

/// One library slot per canonical amino acid, indexed by discriminant.
#[derive(Debug)]
pub struct RotamerLibrary {
    libraries: [Option<Arc<SingleResidueDunbrackLibrary>>; AminoAcid::COUNT],
    config: RotamerLibraryConfig,
    params: DunbrackParameterSet,
}

/// One preamble record: the structural facts a cache must agree on.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PreambleEntry {
    aa: AminoAcid,
    n_chi_total: usize,
    bb_independent: bool,
    symmetric: bool,
    start_angle: f64,
}

enum LibrarySpec<'a> {
    Rotameric(&'a RotamericParams),
    SemiRotameric(&'a SemiRotamericParams),
}

impl LibrarySpec<'_> {
    fn aa(&self) -> AminoAcid {
        match self {
            LibrarySpec::Rotameric(p) => p.aa,
            LibrarySpec::SemiRotameric(p) => p.aa,
        }
    }

    fn preamble_entry(&self) -> PreambleEntry {
        match self {
            LibrarySpec::Rotameric(p) => PreambleEntry {
                aa: p.aa,
                n_chi_total: p.n_chi,
                bb_independent: false,
                symmetric: false,
                start_angle: -180.0,
            },
            LibrarySpec::SemiRotameric(p) => PreambleEntry {
                aa: p.aa,
                n_chi_total: p.n_rotameric_chi + 1,
                bb_independent: p.scoring_bb_independent,
                symmetric: p.symmetric,
                start_angle: p.start_angle,
            },
        }
    }
}

fn ordered_specs(params: &DunbrackParameterSet) -> Vec<LibrarySpec<'_>> {
    let mut specs: Vec<LibrarySpec<'_>> = params
        .rotameric
        .iter()
        .map(LibrarySpec::Rotameric)
        .chain(params.semi_rotameric.iter().map(LibrarySpec::SemiRotameric))
        .collect();
    specs.sort_by_key(|s| s.aa().code());
    specs
}

impl RotamerLibrary {
    /// Loads the configured family, preferring a trusted binary cache and
    /// falling back to the ASCII source otherwise.
    pub fn load(config: RotamerLibraryConfig) -> Result<Self, DunbrackError> {
        let params = config.family.parameter_set();
        let started = Instant::now();

        if let Some(cache) = config.binary_cache.clone() {
            if Self::binary_is_trusted(&cache, &config.family, &params) {
                match Self::read_binary_cache(&cache, &config, &params) {
                    Ok(store) => {
                        info!(
                            path = %cache.display(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            bytes = store.memory_usage_in_bytes(),
                            "Loaded rotamer library from binary cache"
                        );
                        return Ok(store);
                    }
                    Err(e) => {
                        warn!(
                            path = %cache.display(),
                            error = %e,
                            "Binary cache payload unreadable; falling back to ASCII"
                        );
                    }
                }
            }
        }

        let store = Self::read_ascii(&config, &params)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = store.memory_usage_in_bytes(),
            "Loaded rotamer library from ASCII source"
        );

        if let Some(cache) = &store.config.binary_cache {
            if store.config.dont_rewrite_cache {
                debug!(path = %cache.display(), "Cache rewrite disabled; leaving cache alone");
            } else if let Err(e) = store.write_binary_cache(cache) {
                // Losing the cache only costs the next startup some time.
                warn!(path = %cache.display(), error = %e, "Failed to write binary cache");
            }
        }
        Ok(store)
    }

    fn empty(config: RotamerLibraryConfig, params: DunbrackParameterSet) -> Self {
        Self {
            libraries: std::array::from_fn(|_| None),
            config,
            params,
        }
    }

    /// Registers one amino acid's library; a second registration for the
    /// same amino acid is a fatal configuration error.
    pub fn add_residue_library(
        &mut self,
        library: SingleResidueDunbrackLibrary,
    ) -> Result<(), DunbrackError> {
        let aa = library.aa();
        let slot = &mut self.libraries[aa.code() as usize];
        if slot.is_some() {
            return Err(DunbrackError::DuplicateLibrary(aa));
        }
        *slot = Some(Arc::new(library));
        Ok(())
    }

    pub fn get_library_by_aa(&self, aa: AminoAcid) -> Option<&Arc<SingleResidueDunbrackLibrary>> {
        self.libraries[aa.code() as usize].as_ref()
    }

    pub fn params(&self) -> &DunbrackParameterSet {
        &self.params
    }

    pub fn memory_usage_in_bytes(&self) -> usize {
        self.libraries
            .iter()
            .flatten()
            .map(|lib| lib.memory_usage_in_bytes())
            .sum()
    }

    /// Reloads the ASCII source and compares it slot by slot against this
    /// store, logging every mismatch. Returns whether everything agreed.
    pub fn validate_against_ascii(&self) -> Result<bool, DunbrackError> {
        let fresh = Self::read_ascii(&self.config, &self.params)?;
        let mut all_match = true;
        for aa in AminoAcid::ALL {
            match (self.get_library_by_aa(aa), fresh.get_library_by_aa(aa)) {
                (None, None) => {}
                (Some(ours), Some(theirs)) if **ours == **theirs => {
                    debug!(%aa, "Library matches ASCII source");
                }
                _ => {
                    error!(%aa, "Library disagrees with ASCII source");
                    all_match = false;
                }
            }
        }
        Ok(all_match)
    }

    // ---- binary cache ----

    /// A cache is trusted only if it opens and its full structural preamble
    /// matches the family's hard-coded parameters.
    fn binary_is_trusted(
        path: &Path,
        family: &LibraryFamily,
        params: &DunbrackParameterSet,
    ) -> bool {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No usable binary cache");
                return false;
            }
        };
        let mut reader = BufReader::new(file);
        match Self::validate_preamble(&mut reader, family, params) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    reason = %e,
                    "Binary cache is stale or foreign; reading ASCII instead"
                );
                false
            }
        }
    }

    fn write_preamble<W: Write>(
        family: &LibraryFamily,
        params: &DunbrackParameterSet,
        out: &mut W,
    ) -> std::io::Result<()> {
        write_i32(out, family.binary_version())?;
        let specs = ordered_specs(params);
        write_i32(out, specs.len() as i32)?;
        for spec in &specs {
            let entry = spec.preamble_entry();
            write_i32(out, entry.aa.code() as i32)?;
            write_i32(out, entry.n_chi_total as i32)?;
            write_i32(out, entry.bb_independent as i32)?;
            write_i32(out, entry.symmetric as i32)?;
            write_f64(out, entry.start_angle)?;
        }
        Ok(())
    }

    fn validate_preamble<R: Read>(
        input: &mut R,
        family: &LibraryFamily,
        params: &DunbrackParameterSet,
    ) -> Result<(), DunbrackError> {
        let version = read_i32(input, "cache format version")?;
        if version != family.binary_version() {
            return Err(DunbrackError::MalformedBinary(format!(
                "format version {version}, expected {}",
                family.binary_version()
            )));
        }
        let count = read_count(input, "library count", AminoAcid::COUNT)?;
        let specs = ordered_specs(params);
        if count != specs.len() {
            return Err(DunbrackError::MalformedBinary(format!(
                "{count} libraries in preamble, expected {}",
                specs.len()
            )));
        }
        for spec in &specs {
            let expected = spec.preamble_entry();
            let aa_code = read_i32(input, "preamble amino acid")?;
            let n_chi = read_i32(input, "preamble chi count")?;
            let bb_independent = read_i32(input, "preamble independence flag")? != 0;
            let symmetric = read_i32(input, "preamble symmetry flag")? != 0;
            let start_angle = read_f64(input, "preamble start angle")?;
            let matches = aa_code == expected.aa.code() as i32
                && n_chi == expected.n_chi_total as i32
                && bb_independent == expected.bb_independent
                && symmetric == expected.symmetric
                && (start_angle - expected.start_angle).abs() < 1e-9;
            if !matches {
                return Err(DunbrackError::MalformedBinary(format!(
                    "preamble record for {} disagrees with the current parameter set",
                    expected.aa
                )));
            }
        }
        Ok(())
    }

    fn read_binary_cache(
        path: &Path,
        config: &RotamerLibraryConfig,
        params: &DunbrackParameterSet,
    ) -> Result<Self, DunbrackError> {
        let file = File::open(path).map_err(|source| DunbrackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        Self::validate_preamble(&mut reader, &config.family, params)?;

        let expected = params.n_libraries();
        let found = read_count(&mut reader, "payload library count", AminoAcid::COUNT)?;
        if found != expected {
            return Err(DunbrackError::LibraryCountMismatch {
                path: path.to_path_buf(),
                expected,
                found,
            });
        }

        let mut store = Self::empty(config.clone(), params.clone());
        for _ in 0..found {
            let code = read_i32(&mut reader, "payload amino acid")?;
            let aa = u8::try_from(code)
                .ok()
                .and_then(AminoAcid::from_code)
                .ok_or_else(|| {
                    DunbrackError::MalformedBinary(format!("amino acid code {code} in payload"))
                })?;
            let library = SingleResidueDunbrackLibrary::read_binary(aa, &mut reader)?;
            store.add_residue_library(library)?;
        }
        Ok(store)
    }

    /// Writes the cache atomically: a uniquely named temporary file in the
    /// destination directory, renamed over the target, then set read-only.
    pub fn write_binary_cache(&self, path: &Path) -> Result<(), DunbrackError> {
        let io_err = |source: std::io::Error| DunbrackError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut temp = tempfile::Builder::new()
            .prefix(".rotlib-cache-")
            .tempfile_in(dir.unwrap_or_else(|| Path::new(".")))
            .map_err(io_err)?;

        {
            let mut out = BufWriter::new(temp.as_file_mut());
            Self::write_preamble(&self.config.family, &self.params, &mut out).map_err(io_err)?;
            let specs = ordered_specs(&self.params);
            write_i32(&mut out, specs.len() as i32).map_err(io_err)?;
            for spec in &specs {
                let aa = spec.aa();
                let library = self.get_library_by_aa(aa).ok_or_else(|| {
                    DunbrackError::MalformedBinary(format!(
                        "cannot cache an incomplete store (missing {aa})"
                    ))
                })?;
                write_i32(&mut out, aa.code() as i32).map_err(io_err)?;
                library.write_binary(&mut out).map_err(io_err)?;
            }
            out.flush().map_err(io_err)?;
        }

        temp.persist(path).map_err(|e| io_err(e.error))?;

        match std::fs::metadata(path) {
            Ok(meta) => {
                let mut perms = meta.permissions();
                perms.set_readonly(true);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    warn!(path = %path.display(), error = %e, "Could not mark cache read-only");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not stat freshly written cache");
            }
        }
        info!(path = %path.display(), "Wrote binary rotamer library cache");
        Ok(())
    }

    // ---- ASCII source ----

    fn read_ascii(
        config: &RotamerLibraryConfig,
        params: &DunbrackParameterSet,
    ) -> Result<Self, DunbrackError> {
        match &config.family {
            LibraryFamily::Legacy02 { ascii_file } => {
                Self::read_ascii_02(ascii_file, config, params)
            }
            LibraryFamily::Current10 { ascii_dir } => Self::read_ascii_10(ascii_dir, config, params),
        }
    }

    /// The legacy family: one file, amino acids in contiguous runs, each
    /// line `AAA phi psi w1..wK prob mean1..K sd1..K`.
    fn read_ascii_02(
        path: &Path,
        config: &RotamerLibraryConfig,
        params: &DunbrackParameterSet,
    ) -> Result<Self, DunbrackError> {
        let reader = open_text(path)?;
        let mut sections: Vec<(AminoAcid, Vec<AsciiRotamerLine>)> = Vec::new();

        for (line_no, line) in numbered_lines(reader, path)? {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let aa: AminoAcid = fields[0]
                .parse()
                .map_err(|e: crate::core::models::aa::UnknownAminoAcid| {
                    DunbrackError::UnknownAminoAcid(e.0)
                })?;
            let spec = params.rotameric_for(aa).ok_or_else(|| parse_err(
                path,
                line_no,
                format!("{aa} carries no side-chain statistics in this family"),
            ))?;
            let parsed = parse_rotamer_line(path, line_no, &fields, spec.n_bb, spec.n_chi)?;

            match sections.last_mut() {
                Some((current, lines)) if *current == aa => lines.push(parsed),
                _ => {
                    if sections.iter().any(|(seen, _)| *seen == aa) {
                        return Err(parse_err(
                            path,
                            line_no,
                            format!("{aa} appears in two separate runs"),
                        ));
                    }
                    sections.push((aa, vec![parsed]));
                }
            }
        }

        if sections.len() != params.n_libraries() {
            return Err(DunbrackError::LibraryCountMismatch {
                path: path.to_path_buf(),
                expected: params.n_libraries(),
                found: sections.len(),
            });
        }

        let mut store = Self::empty(config.clone(), params.clone());
        for (aa, lines) in sections {
            let spec = params
                .rotameric_for(aa)
                .ok_or_else(|| DunbrackError::UnknownAminoAcid(aa.to_string()))?;
            let model = build_rotameric_model(
                path,
                aa,
                spec.n_chi,
                spec.n_bb,
                lines,
                config.use_bicubic,
                config.family.classifier(),
            )?;
            store.add_residue_library(SingleResidueDunbrackLibrary::Rotameric(model))?;
        }
        Ok(store)
    }

    /// The current family: per-amino-acid files under one directory.
    fn read_ascii_10(
        dir: &Path,
        config: &RotamerLibraryConfig,
        params: &DunbrackParameterSet,
    ) -> Result<Self, DunbrackError> {
        let mut store = Self::empty(config.clone(), params.clone());

        for spec in &params.rotameric {
            let path = dun10_rotamer_file(dir, spec.aa);
            let lines = read_rotamer_file(&path, spec.aa, spec.n_bb, spec.n_chi)?;
            let model = build_rotameric_model(
                &path,
                spec.aa,
                spec.n_chi,
                spec.n_bb,
                lines,
                config.use_bicubic,
                config.family.classifier(),
            )?;
            store.add_residue_library(SingleResidueDunbrackLibrary::Rotameric(model))?;
        }

        for spec in &params.semi_rotameric {
            let rot_path = dun10_rotamer_file(dir, spec.aa);
            let lines = read_rotamer_file(&rot_path, spec.aa, spec.n_bb, spec.n_rotameric_chi)?;
            let rotameric = build_rotameric_model(
                &rot_path,
                spec.aa,
                spec.n_rotameric_chi,
                spec.n_bb,
                lines,
                config.use_bicubic,
                config.family.classifier(),
            )?;

            let density_path = dun10_density_file(dir, spec.aa);
            let (n_nrchi_bins, density_energy) =
                read_density_file(&density_path, spec.aa, rotameric.grid())?;

            let defs_path = dun10_definitions_file(dir, spec.aa, spec.n_rotameric_chi + 1);
            let nrchi_wells = read_definitions_file(&defs_path)?;

            let model = SemiRotamericModel::new(
                rotameric,
                spec.symmetric,
                spec.start_angle,
                n_nrchi_bins,
                density_energy,
                nrchi_wells,
            )?;
            store.add_residue_library(SingleResidueDunbrackLibrary::SemiRotameric(model))?;
        }

        Ok(store)
    }
}

fn dun10_rotamer_file(dir: &Path, aa: AminoAcid) -> PathBuf {
    dir.join(format!("{}.bbdep.rotamers.lib", aa.three_letter().to_lowercase()))
}

fn dun10_density_file(dir: &Path, aa: AminoAcid) -> PathBuf {
    dir.join(format!("{}.bbdep.densities.lib", aa.three_letter().to_lowercase()))
}

fn dun10_definitions_file(dir: &Path, aa: AminoAcid, terminal_chi: usize) -> PathBuf {
    dir.join(format!(
        "{}.chi{terminal_chi}.definitions.lib",
        aa.three_letter().to_lowercase()
    ))
}

struct AsciiRotamerLine {
    backbone: Vec<f64>,
    record: RotamerRecord,
}

fn open_text(path: &Path) -> Result<BufReader<File>, DunbrackError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| DunbrackError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Collects non-empty, non-comment lines with their 1-based numbers.
fn numbered_lines(
    reader: BufReader<File>,
    path: &Path,
) -> Result<Vec<(usize, String)>, DunbrackError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| DunbrackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push((idx + 1, trimmed.to_string()));
    }
    Ok(out)
}

fn parse_err(path: &Path, line: usize, message: String) -> DunbrackError {
    DunbrackError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    }
}

fn parse_f64(path: &Path, line: usize, field: &str) -> Result<f64, DunbrackError> {
    field
        .parse()
        .map_err(|_| parse_err(path, line, format!("'{field}' is not a number")))
}

fn parse_rotamer_line(
    path: &Path,
    line_no: usize,
    fields: &[&str],
    n_bb: usize,
    n_chi: usize,
) -> Result<AsciiRotamerLine, DunbrackError> {
    let expected = 1 + n_bb + n_chi + 1 + 2 * n_chi;
    if fields.len() != expected {
        return Err(parse_err(
            path,
            line_no,
            format!("expected {expected} fields, found {}", fields.len()),
        ));
    }

    let mut backbone = Vec::with_capacity(n_bb);
    for field in &fields[1..1 + n_bb] {
        backbone.push(parse_f64(path, line_no, field)?);
    }

    let mut wells = [0u8; MAX_CHI];
    for (i, field) in fields[1 + n_bb..1 + n_bb + n_chi].iter().enumerate() {
        let raw: i64 = field
            .parse()
            .map_err(|_| parse_err(path, line_no, format!("'{field}' is not a well index")))?;
        if !(0..=255).contains(&raw) {
            return Err(parse_err(path, line_no, format!("well index {raw} out of range")));
        }
        wells[i] = raw as u8;
    }

    let probability = parse_f64(path, line_no, fields[1 + n_bb + n_chi])?;

    let mut chi_mean = [0.0; MAX_CHI];
    let mut chi_sd = [1.0; MAX_CHI];
    let means_at = 2 + n_bb + n_chi;
    for i in 0..n_chi {
        chi_mean[i] = parse_f64(path, line_no, fields[means_at + i])?;
        chi_sd[i] = parse_f64(path, line_no, fields[means_at + n_chi + i])?;
    }

    Ok(AsciiRotamerLine {
        backbone,
        record: RotamerRecord {
            wells,
            probability,
            chi_mean,
            chi_sd,
        },
    })
}

fn read_rotamer_file(
    path: &Path,
    aa: AminoAcid,
    n_bb: usize,
    n_chi: usize,
) -> Result<Vec<AsciiRotamerLine>, DunbrackError> {
    let reader = open_text(path)?;
    let mut out = Vec::new();
    for (line_no, line) in numbered_lines(reader, path)? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields[0].parse::<AminoAcid>() != Ok(aa) {
            return Err(parse_err(
                path,
                line_no,
                format!("expected {aa} records, found '{}'", fields[0]),
            ));
        }
        out.push(parse_rotamer_line(path, line_no, &fields, n_bb, n_chi)?);
    }
    Ok(out)
}

/// Derives a regular periodic axis from the distinct values observed along
/// one backbone dimension. Values must sit on `-180 + k * (360 / bins)`.
fn infer_axis(path: &Path, values: &[f64]) -> Result<usize, DunbrackError> {
    let mut distinct: Vec<f64> = Vec::new();
    for &v in values {
        if !distinct.iter().any(|&d| (d - v).abs() < 1e-6) {
            distinct.push(v);
        }
    }
    distinct.sort_by(|a, b| a.total_cmp(b));
    let bins = distinct.len();
    if bins == 0 {
        return Err(parse_err(path, 0, "no backbone samples".to_string()));
    }
    let step = 360.0 / bins as f64;
    for (k, &v) in distinct.iter().enumerate() {
        let expected = -180.0 + k as f64 * step;
        if (v - expected).abs() > 1e-3 {
            return Err(parse_err(
                path,
                0,
                format!("backbone value {v} is off the regular grid (expected {expected})"),
            ));
        }
    }
    Ok(bins)
}

fn infer_grid(path: &Path, backbones: &[Vec<f64>], n_bb: usize) -> Result<BackboneGrid, DunbrackError> {
    let mut bins = Vec::with_capacity(n_bb);
    for dim in 0..n_bb {
        let axis: Vec<f64> = backbones.iter().map(|bb| bb[dim]).collect();
        bins.push(infer_axis(path, &axis)?);
    }
    Ok(BackboneGrid::new(bins))
}

fn grid_bin(grid: &BackboneGrid, backbone: &[f64]) -> usize {
    let coords: Vec<usize> = (0..grid.n_dims())
        .map(|d| {
            let c = grid.continuous_coord(d, backbone[d]).round() as usize;
            c % grid.bins()[d]
        })
        .collect();
    grid.flat_index(&coords)
}

fn build_rotameric_model(
    path: &Path,
    aa: AminoAcid,
    n_chi: usize,
    n_bb: usize,
    lines: Vec<AsciiRotamerLine>,
    use_bicubic: bool,
    classifier: WellClassifier,
) -> Result<RotamericModel, DunbrackError> {
    let backbones: Vec<Vec<f64>> = lines.iter().map(|l| l.backbone.clone()).collect();
    let grid = infer_grid(path, &backbones, n_bb)?;

    let mut bins: Vec<Vec<RotamerRecord>> = vec![Vec::new(); grid.n_points()];
    for line in lines {
        bins[grid_bin(&grid, &line.backbone)].push(line.record);
    }
    RotamericModel::from_bins(aa, n_chi, grid, bins, use_bicubic, classifier)
}

/// Reads a terminal-chi density file: `AAA bb1..bbN p1..pM` per line, one
/// line per backbone bin. Probabilities become `-ln(p)` energies with the
/// usual floor.
fn read_density_file(
    path: &Path,
    aa: AminoAcid,
    grid: &BackboneGrid,
) -> Result<(usize, Vec<f64>), DunbrackError> {
    let reader = open_text(path)?;
    let lines = numbered_lines(reader, path)?;
    let n_bb = grid.n_dims();

    let mut n_nrchi_bins = 0usize;
    let mut density = vec![Vec::new(); grid.n_points()];
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields[0].parse::<AminoAcid>() != Ok(aa) {
            return Err(parse_err(
                path,
                line_no,
                format!("expected {aa} records, found '{}'", fields[0]),
            ));
        }
        if fields.len() <= 1 + n_bb {
            return Err(parse_err(path, line_no, "no density values".to_string()));
        }
        let m = fields.len() - 1 - n_bb;
        if n_nrchi_bins == 0 {
            n_nrchi_bins = m;
        } else if m != n_nrchi_bins {
            return Err(parse_err(
                path,
                line_no,
                format!("{m} density values, expected {n_nrchi_bins}"),
            ));
        }

        let mut backbone = Vec::with_capacity(n_bb);
        for field in &fields[1..1 + n_bb] {
            backbone.push(parse_f64(path, line_no, field)?);
        }
        let bin = grid_bin(grid, &backbone);
        if !density[bin].is_empty() {
            return Err(parse_err(path, line_no, "duplicate backbone bin".to_string()));
        }
        for field in &fields[1 + n_bb..] {
            let p = parse_f64(path, line_no, field)?;
            density[bin].push(-p.max(PROB_FLOOR).ln());
        }
    }

    let mut flat = Vec::with_capacity(grid.n_points() * n_nrchi_bins);
    for (bin, values) in density.into_iter().enumerate() {
        if values.len() != n_nrchi_bins {
            return Err(parse_err(
                path,
                0,
                format!("backbone bin {bin} has no density row"),
            ));
        }
        flat.extend(values);
    }
    Ok((n_nrchi_bins, flat))
}

/// Reads terminal-chi well definitions: `well left right` per line.
fn read_definitions_file(path: &Path) -> Result<Vec<NrchiWell>, DunbrackError> {
    let reader = open_text(path)?;
    let mut wells = Vec::new();
    for (line_no, line) in numbered_lines(reader, path)? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(parse_err(
                path,
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }
        let well: u8 = fields[0]
            .parse()
            .map_err(|_| parse_err(path, line_no, format!("'{}' is not a well id", fields[0])))?;
        let left = parse_f64(path, line_no, fields[1])?;
        let right = parse_f64(path, line_no, fields[2])?;
        wells.push(NrchiWell { well, left, right });
    }
    Ok(wells)
}
