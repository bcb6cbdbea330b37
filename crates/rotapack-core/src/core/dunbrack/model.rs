use super::binary::{read_count, read_f64, read_i32, read_u8, write_f64, write_i32, write_u8};
use super::error::DunbrackError;
use super::params::check_dimensions;
use super::spline::bicubic_periodic;
use super::wells::{RotamerWellAssignment, classify_wells_02, periodic_range};
use super::{MAX_BB, MAX_CHI, PROB_FLOOR};
use crate::core::models::aa::AminoAcid;
use std::collections::HashMap;
use std::io::{Read, Write};

/// A statistical energy sample: the value and its partial derivatives with
/// respect to the backbone torsions and the side-chain torsions, in
/// energy-units per degree.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TorsionEnergy {
    pub value: f64,
    pub d_bb: [f64; MAX_BB],
    pub d_chi: [f64; MAX_CHI],
}

/// One tabulated rotamer at one backbone grid point: the well tuple it is
/// filed under, its probability, and per-chi mean and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotamerRecord {
    pub wells: [u8; MAX_CHI],
    pub probability: f64,
    pub chi_mean: [f64; MAX_CHI],
    pub chi_sd: [f64; MAX_CHI],
}

impl RotamerRecord {
    /// Probability clamped to the library resolution floor, then `-ln`.
    pub fn neg_log_probability(&self) -> f64 {
        -self.probability.max(PROB_FLOOR).ln()
    }
}

/// How observed chi angles are mapped onto the discrete wells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellClassifier {
    /// The legacy hand-tuned decision table (canonical amino acids only).
    Legacy02,
    /// Nearest tabulated mean at the closest backbone grid point.
    NearestMean,
}

/// A regular, periodic grid over 1..=5 backbone-torsion dimensions.
///
/// Every dimension starts at -180 degrees and spans the full circle; the
/// bin width per dimension is `360 / bins[d]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneGrid {
    bins: Vec<usize>,
}

impl BackboneGrid {
    pub fn new(bins: Vec<usize>) -> Self {
        debug_assert!(!bins.is_empty() && bins.len() <= MAX_BB);
        debug_assert!(bins.iter().all(|&b| b >= 1));
        Self { bins }
    }

    pub fn n_dims(&self) -> usize {
        self.bins.len()
    }

    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    pub fn step(&self, dim: usize) -> f64 {
        360.0 / self.bins[dim] as f64
    }

    pub fn n_points(&self) -> usize {
        self.bins.iter().product()
    }

    /// Row-major flat index of integer grid coordinates.
    pub fn flat_index(&self, coords: &[usize]) -> usize {
        let mut idx = 0;
        for (d, &c) in coords.iter().enumerate() {
            debug_assert!(c < self.bins[d]);
            idx = idx * self.bins[d] + c;
        }
        idx
    }

    /// Continuous grid coordinate of an angle along one dimension.
    pub fn continuous_coord(&self, dim: usize, angle: f64) -> f64 {
        let reduced = periodic_range(angle);
        (reduced + 180.0) / self.step(dim)
    }

    /// Nearest integer grid coordinates for a backbone context.
    pub fn nearest_point(&self, backbone: &[f64]) -> Vec<usize> {
        (0..self.n_dims())
            .map(|d| {
                let c = self.continuous_coord(d, backbone[d]).round() as usize;
                c % self.bins[d]
            })
            .collect()
    }
}

/// Multilinear interpolation with gradient over a periodic grid.
///
/// `coords` are continuous grid coordinates (one per dimension); the
/// returned gradient is per grid-index unit.
fn multilinear_periodic<F>(get: F, bins: &[usize], coords: &[f64]) -> (f64, Vec<f64>)
where
    F: Fn(&[usize]) -> f64,
{
    let n = bins.len();
    let base: Vec<i64> = coords.iter().map(|c| c.floor() as i64).collect();
    let frac: Vec<f64> = coords
        .iter()
        .zip(&base)
        .map(|(c, b)| c - *b as f64)
        .collect();

    let mut value = 0.0;
    let mut gradient = vec![0.0; n];
    let mut corner = vec![0usize; n];

    for mask in 0..(1usize << n) {
        let mut weight = 1.0;
        for d in 0..n {
            let hi = (mask >> d) & 1 == 1;
            corner[d] = ((base[d] + if hi { 1 } else { 0 }).rem_euclid(bins[d] as i64)) as usize;
            weight *= if hi { frac[d] } else { 1.0 - frac[d] };
        }
        let v = get(&corner);
        value += weight * v;
        for d in 0..n {
            let hi = (mask >> d) & 1 == 1;
            let mut dw = if hi { 1.0 } else { -1.0 };
            for other in 0..n {
                if other == d {
                    continue;
                }
                let ohi = (mask >> other) & 1 == 1;
                dw *= if ohi { frac[other] } else { 1.0 - frac[other] };
            }
            gradient[d] += dw * v;
        }
    }
    (value, gradient)
}

/// A purely rotameric statistical model: every chi angle is discretely
/// binned, and probabilities/means/spreads are tabulated per backbone grid
/// point for a fixed roster of rotamer well tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct RotamericModel {
    aa: AminoAcid,
    n_chi: usize,
    grid: BackboneGrid,
    /// Packed rotamer number -> well tuple; identical roster at every bin.
    well_tuples: Vec<[u8; MAX_CHI]>,
    well_index: HashMap<[u8; MAX_CHI], usize>,
    /// Records laid out `[bin * n_packed + packed]`.
    records: Vec<RotamerRecord>,
    use_bicubic: bool,
    classifier: WellClassifier,
}

impl RotamericModel {
    /// Assembles a model from per-bin record lists.
    ///
    /// Every backbone bin must carry the same set of well tuples as bin
    /// zero; the packed rotamer ordering is taken from bin zero so that
    /// interpolation tracks one well tuple across neighboring bins.
    pub fn from_bins(
        aa: AminoAcid,
        n_chi: usize,
        grid: BackboneGrid,
        bins: Vec<Vec<RotamerRecord>>,
        use_bicubic: bool,
        classifier: WellClassifier,
    ) -> Result<Self, DunbrackError> {
        check_dimensions(aa, n_chi, grid.n_dims())?;
        debug_assert_eq!(bins.len(), grid.n_points());

        let mut well_tuples: Vec<[u8; MAX_CHI]> = Vec::new();
        let mut well_index = HashMap::new();
        for record in &bins[0] {
            if !well_index.contains_key(&record.wells) {
                well_index.insert(record.wells, well_tuples.len());
                well_tuples.push(record.wells);
            }
        }
        let n_packed = well_tuples.len();

        let mut records = vec![
            RotamerRecord {
                wells: [0; MAX_CHI],
                probability: 0.0,
                chi_mean: [0.0; MAX_CHI],
                chi_sd: [1.0; MAX_CHI],
            };
            grid.n_points() * n_packed
        ];
        let mut seen = vec![false; grid.n_points() * n_packed];

        for (bin, bin_records) in bins.iter().enumerate() {
            for record in bin_records {
                let packed = *well_index.get(&record.wells).ok_or_else(|| {
                    DunbrackError::InconsistentWells {
                        aa,
                        bin,
                        wells: record.wells[..n_chi].to_vec(),
                    }
                })?;
                records[bin * n_packed + packed] = *record;
                seen[bin * n_packed + packed] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            let bin = missing / n_packed;
            let packed = missing % n_packed;
            return Err(DunbrackError::InconsistentWells {
                aa,
                bin,
                wells: well_tuples[packed][..n_chi].to_vec(),
            });
        }

        Ok(Self {
            aa,
            n_chi,
            grid,
            well_tuples,
            well_index,
            records,
            use_bicubic,
            classifier,
        })
    }

    pub fn aa(&self) -> AminoAcid {
        self.aa
    }

    pub fn n_chi(&self) -> usize {
        self.n_chi
    }

    pub fn grid(&self) -> &BackboneGrid {
        &self.grid
    }

    pub fn n_packed_rotamers(&self) -> usize {
        self.well_tuples.len()
    }

    pub fn record(&self, bin: usize, packed: usize) -> &RotamerRecord {
        &self.records[bin * self.well_tuples.len() + packed]
    }

    fn packed_index(&self, wells: &RotamerWellAssignment) -> Option<usize> {
        let mut key = [0u8; MAX_CHI];
        key[..wells.n_chi().min(MAX_CHI)].copy_from_slice(wells.wells());
        // Only the statistical chis participate in the lookup key.
        for w in key.iter_mut().skip(self.n_chi) {
            *w = 0;
        }
        self.well_index.get(&key).copied()
    }

    /// Classifies observed chi angles into this model's discrete wells.
    pub fn classify_wells(&self, backbone: &[f64], chi: &[f64]) -> RotamerWellAssignment {
        match self.classifier {
            WellClassifier::Legacy02 => classify_wells_02(self.aa, chi),
            WellClassifier::NearestMean => {
                let nearest = self.grid.nearest_point(backbone);
                let bin = self.grid.flat_index(&nearest);
                let n = self.n_chi.min(chi.len());
                let mut best: Option<(f64, usize)> = None;
                for packed in 0..self.well_tuples.len() {
                    let record = self.record(bin, packed);
                    let dist: f64 = (0..n)
                        .map(|i| periodic_range(chi[i] - record.chi_mean[i]).abs())
                        .sum();
                    if best.is_none_or(|(d, _)| dist < d) {
                        best = Some((dist, packed));
                    }
                }
                match best {
                    Some((_, packed)) => {
                        RotamerWellAssignment::from_slice(&self.well_tuples[packed][..n])
                    }
                    None => RotamerWellAssignment::default(),
                }
            }
        }
    }

    /// Interpolates `-ln(p)` for one packed rotamer across the backbone
    /// grid. Returns the value and the per-degree backbone gradient.
    fn interpolated_neg_log_prob(&self, packed: usize, backbone: &[f64]) -> (f64, Vec<f64>) {
        let n_packed = self.well_tuples.len();
        let bins = self.grid.bins();
        let coords: Vec<f64> = (0..self.grid.n_dims())
            .map(|d| self.grid.continuous_coord(d, backbone[d]))
            .collect();

        if self.use_bicubic && self.grid.n_dims() == 2 {
            let get = |i: usize, j: usize| {
                self.records[(i * bins[1] + j) * n_packed + packed].neg_log_probability()
            };
            let sample = bicubic_periodic(get, bins[0], bins[1], coords[0], coords[1]);
            let grad = vec![
                sample.d_dx / self.grid.step(0),
                sample.d_dy / self.grid.step(1),
            ];
            (sample.value, grad)
        } else {
            let get = |corner: &[usize]| {
                self.records[self.grid.flat_index(corner) * n_packed + packed]
                    .neg_log_probability()
            };
            let (value, grad) = multilinear_periodic(get, bins, &coords);
            let grad = grad
                .iter()
                .enumerate()
                .map(|(d, g)| g / self.grid.step(d))
                .collect();
            (value, grad)
        }
    }

    /// Interpolated mean and standard deviation for one chi of one packed
    /// rotamer. Means are interpolated in an offset frame anchored at the
    /// floor bin so well means near the +/-180 seam blend correctly.
    fn interpolated_mean_sd(&self, packed: usize, chi_index: usize, backbone: &[f64]) -> (f64, f64) {
        let n_packed = self.well_tuples.len();
        let bins = self.grid.bins();
        let coords: Vec<f64> = (0..self.grid.n_dims())
            .map(|d| self.grid.continuous_coord(d, backbone[d]))
            .collect();

        let anchor_corner: Vec<usize> = coords
            .iter()
            .enumerate()
            .map(|(d, c)| (c.floor() as i64).rem_euclid(bins[d] as i64) as usize)
            .collect();
        let anchor = self.records[self.grid.flat_index(&anchor_corner) * n_packed + packed]
            .chi_mean[chi_index];

        let (mean_offset, _) = multilinear_periodic(
            |corner: &[usize]| {
                let m =
                    self.records[self.grid.flat_index(corner) * n_packed + packed].chi_mean[chi_index];
                periodic_range(m - anchor)
            },
            bins,
            &coords,
        );
        let (sd, _) = multilinear_periodic(
            |corner: &[usize]| {
                self.records[self.grid.flat_index(corner) * n_packed + packed].chi_sd[chi_index]
            },
            bins,
            &coords,
        );
        (periodic_range(anchor + mean_offset), sd.max(1e-2))
    }

    /// Statistical energy of the observed conformation at the given
    /// backbone context: interpolated `-ln(p)` of the classified rotamer
    /// plus the squared normalized chi deviations from the well means.
    pub fn rotamer_energy(&self, backbone: &[f64], chi: &[f64]) -> TorsionEnergy {
        let wells = self.classify_wells(backbone, chi);
        let Some(packed) = self.packed_index(&wells) else {
            return TorsionEnergy::default();
        };

        let (mut value, bb_grad) = self.interpolated_neg_log_prob(packed, backbone);
        let mut out = TorsionEnergy::default();
        for (d, g) in bb_grad.iter().enumerate() {
            out.d_bb[d] = *g;
        }

        for i in 0..self.n_chi.min(chi.len()) {
            let (mean, sd) = self.interpolated_mean_sd(packed, i, backbone);
            let dev = periodic_range(chi[i] - mean);
            value += (dev / sd).powi(2);
            out.d_chi[i] = 2.0 * dev / (sd * sd);
        }
        out.value = value;
        out
    }

    /// Either the interpolated `-ln(p)` of the classified current rotamer,
    /// or the minimum over every tabulated rotamer.
    pub fn best_rotamer_energy(
        &self,
        backbone: &[f64],
        chi: &[f64],
        current_rotamer_only: bool,
    ) -> f64 {
        if current_rotamer_only {
            let wells = self.classify_wells(backbone, chi);
            match self.packed_index(&wells) {
                Some(packed) => self.interpolated_neg_log_prob(packed, backbone).0,
                None => 0.0,
            }
        } else {
            (0..self.well_tuples.len())
                .map(|packed| self.interpolated_neg_log_prob(packed, backbone).0)
                .fold(f64::INFINITY, f64::min)
        }
    }

    /// Candidate chi vectors for side-chain sampling at a backbone context:
    /// the tabulated means at the nearest grid point, most probable first.
    pub fn sample_chi_sets(&self, backbone: &[f64]) -> Vec<Vec<f64>> {
        let bin = self.grid.flat_index(&self.grid.nearest_point(backbone));
        let mut ranked: Vec<&RotamerRecord> = (0..self.well_tuples.len())
            .map(|packed| self.record(bin, packed))
            .collect();
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        ranked
            .iter()
            .map(|r| r.chi_mean[..self.n_chi].to_vec())
            .collect()
    }

    pub fn memory_usage_in_bytes(&self) -> usize {
        self.records.len() * std::mem::size_of::<RotamerRecord>()
            + self.well_tuples.len() * (MAX_CHI + std::mem::size_of::<usize>())
    }

    pub fn write_binary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write_u8(out, 1)?;
        write_i32(out, self.n_chi as i32)?;
        write_i32(out, self.grid.n_dims() as i32)?;
        for &b in self.grid.bins() {
            write_i32(out, b as i32)?;
        }
        write_i32(out, self.well_tuples.len() as i32)?;
        for tuple in &self.well_tuples {
            for i in 0..self.n_chi {
                write_i32(out, tuple[i] as i32)?;
            }
        }
        for record in &self.records {
            write_f64(out, record.probability)?;
            for i in 0..self.n_chi {
                write_f64(out, record.chi_mean[i])?;
            }
            for i in 0..self.n_chi {
                write_f64(out, record.chi_sd[i])?;
            }
        }
        write_u8(out, self.use_bicubic as u8)?;
        write_u8(
            out,
            match self.classifier {
                WellClassifier::Legacy02 => 0,
                WellClassifier::NearestMean => 1,
            },
        )?;
        Ok(())
    }

    /// Reads the payload written by [`Self::write_binary`], minus the
    /// leading tag byte (consumed by the caller for dispatch).
    pub fn read_binary_body<R: Read>(aa: AminoAcid, input: &mut R) -> Result<Self, DunbrackError> {
        let n_chi = read_count(input, "chi count", MAX_CHI)?;
        let n_bb = read_count(input, "backbone dimension count", MAX_BB)?;
        check_dimensions(aa, n_chi, n_bb)?;

        let mut bins = Vec::with_capacity(n_bb);
        for _ in 0..n_bb {
            bins.push(read_count(input, "backbone bin count", 3600)?.max(1));
        }
        let grid = BackboneGrid::new(bins);

        let n_packed = read_count(input, "packed rotamer count", 1 << 20)?;
        let mut well_tuples = Vec::with_capacity(n_packed);
        let mut well_index = HashMap::with_capacity(n_packed);
        for packed in 0..n_packed {
            let mut tuple = [0u8; MAX_CHI];
            for slot in tuple.iter_mut().take(n_chi) {
                *slot = read_i32(input, "well tuple")? as u8;
            }
            well_index.insert(tuple, packed);
            well_tuples.push(tuple);
        }

        let n_records = grid.n_points() * n_packed;
        let mut records = Vec::with_capacity(n_records);
        for flat in 0..n_records {
            let probability = read_f64(input, "rotamer probability")?;
            let mut chi_mean = [0.0; MAX_CHI];
            let mut chi_sd = [1.0; MAX_CHI];
            for m in chi_mean.iter_mut().take(n_chi) {
                *m = read_f64(input, "chi mean")?;
            }
            for s in chi_sd.iter_mut().take(n_chi) {
                *s = read_f64(input, "chi standard deviation")?;
            }
            records.push(RotamerRecord {
                wells: well_tuples[flat % n_packed],
                probability,
                chi_mean,
                chi_sd,
            });
        }

        let use_bicubic = read_u8(input, "interpolation flag")? != 0;
        let classifier = match read_u8(input, "classifier tag")? {
            0 => WellClassifier::Legacy02,
            1 => WellClassifier::NearestMean,
            other => {
                return Err(DunbrackError::MalformedBinary(format!(
                    "unknown classifier tag {other}"
                )));
            }
        };

        Ok(Self {
            aa,
            n_chi,
            grid,
            well_tuples,
            well_index,
            records,
            use_bicubic,
            classifier,
        })
    }
}

/// Boundaries of one continuous-terminal-chi well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NrchiWell {
    pub well: u8,
    pub left: f64,
    pub right: f64,
}

/// A semi-rotameric model: a rotameric prefix plus one continuous terminal
/// chi scored against a per-backbone-bin density table.
#[derive(Debug, Clone, PartialEq)]
pub struct SemiRotamericModel {
    rotameric: RotamericModel,
    symmetric: bool,
    start_angle: f64,
    n_nrchi_bins: usize,
    /// `-ln(density)` laid out `[bb_bin * n_nrchi_bins + k]`.
    density_energy: Vec<f64>,
    nrchi_wells: Vec<NrchiWell>,
}

impl SemiRotamericModel {
    pub fn new(
        rotameric: RotamericModel,
        symmetric: bool,
        start_angle: f64,
        n_nrchi_bins: usize,
        density_energy: Vec<f64>,
        nrchi_wells: Vec<NrchiWell>,
    ) -> Result<Self, DunbrackError> {
        let expected = rotameric.grid().n_points() * n_nrchi_bins;
        if density_energy.len() != expected {
            return Err(DunbrackError::MalformedBinary(format!(
                "terminal chi density table for {} has {} entries, expected {}",
                rotameric.aa(),
                density_energy.len(),
                expected
            )));
        }
        Ok(Self {
            rotameric,
            symmetric,
            start_angle,
            n_nrchi_bins,
            density_energy,
            nrchi_wells,
        })
    }

    pub fn rotameric(&self) -> &RotamericModel {
        &self.rotameric
    }

    pub fn aa(&self) -> AminoAcid {
        self.rotameric.aa()
    }

    /// Total chi count: the rotameric prefix plus the terminal chi.
    pub fn n_chi(&self) -> usize {
        self.rotameric.n_chi() + 1
    }

    pub fn symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn start_angle(&self) -> f64 {
        self.start_angle
    }

    fn period(&self) -> f64 {
        if self.symmetric { 180.0 } else { 360.0 }
    }

    /// Reduces a terminal chi into `[start_angle, start_angle + period)`.
    fn reduce_terminal(&self, chi: f64) -> f64 {
        let p = self.period();
        (chi - self.start_angle).rem_euclid(p) + self.start_angle
    }

    fn terminal_well(&self, chi: f64) -> u8 {
        let reduced = self.reduce_terminal(chi);
        for w in &self.nrchi_wells {
            if reduced >= w.left && reduced < w.right {
                return w.well;
            }
        }
        // Guarded ladder: the boundary value (or an empty definitions
        // table) must still classify somewhere.
        self.nrchi_wells.last().map(|w| w.well).unwrap_or(0)
    }

    /// Density energy for the terminal chi, linearly interpolated along the
    /// terminal dimension and multilinearly across the backbone grid.
    fn terminal_energy(&self, backbone: &[f64], terminal_chi: f64) -> (f64, f64, Vec<f64>) {
        let grid = self.rotameric.grid();
        let bins = grid.bins();
        let step = self.period() / self.n_nrchi_bins as f64;
        let t = (self.reduce_terminal(terminal_chi) - self.start_angle) / step;

        let bb_coords: Vec<f64> = (0..grid.n_dims())
            .map(|d| grid.continuous_coord(d, backbone[d]))
            .collect();

        let k0 = t.floor() as i64;
        let frac = t - k0 as f64;
        let ka = k0.rem_euclid(self.n_nrchi_bins as i64) as usize;
        let kb = (k0 + 1).rem_euclid(self.n_nrchi_bins as i64) as usize;

        let (e_lo, grad_lo) = multilinear_periodic(
            |corner: &[usize]| {
                self.density_energy[grid.flat_index(corner) * self.n_nrchi_bins + ka]
            },
            bins,
            &bb_coords,
        );
        let (e_hi, grad_hi) = multilinear_periodic(
            |corner: &[usize]| {
                self.density_energy[grid.flat_index(corner) * self.n_nrchi_bins + kb]
            },
            bins,
            &bb_coords,
        );

        let value = e_lo * (1.0 - frac) + e_hi * frac;
        let d_terminal = (e_hi - e_lo) / step;
        let d_bb: Vec<f64> = grad_lo
            .iter()
            .zip(&grad_hi)
            .enumerate()
            .map(|(d, (lo, hi))| (lo * (1.0 - frac) + hi * frac) / grid.step(d))
            .collect();
        (value, d_terminal, d_bb)
    }

    pub fn classify_wells(&self, backbone: &[f64], chi: &[f64]) -> RotamerWellAssignment {
        let n_rot = self.rotameric.n_chi();
        let prefix = self
            .rotameric
            .classify_wells(backbone, &chi[..n_rot.min(chi.len())]);
        let mut wells = [0u8; MAX_CHI];
        wells[..prefix.n_chi()].copy_from_slice(prefix.wells());
        let n = chi.len().min(MAX_CHI);
        if chi.len() > n_rot && n_rot < MAX_CHI {
            wells[n_rot] = self.terminal_well(chi[n_rot]);
        }
        RotamerWellAssignment::new(wells, n)
    }

    pub fn rotamer_energy(&self, backbone: &[f64], chi: &[f64]) -> TorsionEnergy {
        let n_rot = self.rotameric.n_chi();
        let mut out = self
            .rotameric
            .rotamer_energy(backbone, &chi[..n_rot.min(chi.len())]);
        if chi.len() > n_rot {
            let (value, d_terminal, d_bb) = self.terminal_energy(backbone, chi[n_rot]);
            out.value += value;
            if n_rot < MAX_CHI {
                out.d_chi[n_rot] = d_terminal;
            }
            for (d, g) in d_bb.iter().enumerate() {
                out.d_bb[d] += g;
            }
        }
        out
    }

    pub fn best_rotamer_energy(
        &self,
        backbone: &[f64],
        chi: &[f64],
        current_rotamer_only: bool,
    ) -> f64 {
        let n_rot = self.rotameric.n_chi();
        let rotameric_part = self.rotameric.best_rotamer_energy(
            backbone,
            &chi[..n_rot.min(chi.len())],
            current_rotamer_only,
        );
        if current_rotamer_only && chi.len() > n_rot {
            rotameric_part + self.terminal_energy(backbone, chi[n_rot]).0
        } else if current_rotamer_only {
            rotameric_part
        } else {
            // Minimum over the continuous terminal chi is its lowest bin.
            let grid = self.rotameric.grid();
            let nearest = grid.nearest_point(backbone);
            let bin = grid.flat_index(&nearest);
            let best_terminal = self.density_energy
                [bin * self.n_nrchi_bins..(bin + 1) * self.n_nrchi_bins]
                .iter()
                .fold(f64::INFINITY, |acc, &e| acc.min(e));
            rotameric_part + best_terminal
        }
    }

    pub fn nrchi_wells(&self) -> &[NrchiWell] {
        &self.nrchi_wells
    }

    /// Candidate chi vectors: every rotameric sample crossed with the
    /// midpoint of every terminal-chi well.
    pub fn sample_chi_sets(&self, backbone: &[f64]) -> Vec<Vec<f64>> {
        let terminal: Vec<f64> = if self.nrchi_wells.is_empty() {
            vec![self.start_angle]
        } else {
            self.nrchi_wells
                .iter()
                .map(|w| 0.5 * (w.left + w.right))
                .collect()
        };
        let mut out = Vec::new();
        for prefix in self.rotameric.sample_chi_sets(backbone) {
            for &t in &terminal {
                let mut chi = prefix.clone();
                chi.push(t);
                out.push(chi);
            }
        }
        out
    }

    pub fn memory_usage_in_bytes(&self) -> usize {
        self.rotameric.memory_usage_in_bytes()
            + self.density_energy.len() * std::mem::size_of::<f64>()
            + self.nrchi_wells.len() * std::mem::size_of::<NrchiWell>()
    }

    pub fn write_binary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write_u8(out, 2)?;
        self.rotameric.write_binary(out)?;
        write_u8(out, self.symmetric as u8)?;
        write_f64(out, self.start_angle)?;
        write_i32(out, self.n_nrchi_bins as i32)?;
        for &e in &self.density_energy {
            write_f64(out, e)?;
        }
        write_i32(out, self.nrchi_wells.len() as i32)?;
        for w in &self.nrchi_wells {
            write_u8(out, w.well)?;
            write_f64(out, w.left)?;
            write_f64(out, w.right)?;
        }
        Ok(())
    }

    pub fn read_binary_body<R: Read>(aa: AminoAcid, input: &mut R) -> Result<Self, DunbrackError> {
        let inner_tag = read_u8(input, "inner model tag")?;
        if inner_tag != 1 {
            return Err(DunbrackError::MalformedBinary(format!(
                "expected rotameric sub-model (tag 1), found tag {inner_tag}"
            )));
        }
        let rotameric = RotamericModel::read_binary_body(aa, input)?;
        let symmetric = read_u8(input, "symmetry flag")? != 0;
        let start_angle = read_f64(input, "terminal chi start angle")?;
        let n_nrchi_bins = read_count(input, "terminal chi bin count", 3600)?.max(1);

        let n_density = rotameric.grid().n_points() * n_nrchi_bins;
        let mut density_energy = Vec::with_capacity(n_density);
        for _ in 0..n_density {
            density_energy.push(read_f64(input, "terminal chi density")?);
        }

        let n_wells = read_count(input, "terminal chi well count", 256)?;
        let mut nrchi_wells = Vec::with_capacity(n_wells);
        for _ in 0..n_wells {
            let well = read_u8(input, "terminal chi well id")?;
            let left = read_f64(input, "terminal chi well left edge")?;
            let right = read_f64(input, "terminal chi well right edge")?;
            nrchi_wells.push(NrchiWell { well, left, right });
        }

        Self::new(
            rotameric,
            symmetric,
            start_angle,
            n_nrchi_bins,
            density_energy,
            nrchi_wells,
        )
    }
}

/// One amino acid's statistical model, in one of its two closed variants.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleResidueDunbrackLibrary {
    Rotameric(RotamericModel),
    SemiRotameric(SemiRotamericModel),
}

impl SingleResidueDunbrackLibrary {
    pub fn aa(&self) -> AminoAcid {
        match self {
            Self::Rotameric(m) => m.aa(),
            Self::SemiRotameric(m) => m.aa(),
        }
    }

    pub fn n_chi(&self) -> usize {
        match self {
            Self::Rotameric(m) => m.n_chi(),
            Self::SemiRotameric(m) => m.n_chi(),
        }
    }

    pub fn classify_wells(&self, backbone: &[f64], chi: &[f64]) -> RotamerWellAssignment {
        match self {
            Self::Rotameric(m) => m.classify_wells(backbone, chi),
            Self::SemiRotameric(m) => m.classify_wells(backbone, chi),
        }
    }

    pub fn rotamer_energy(&self, backbone: &[f64], chi: &[f64]) -> TorsionEnergy {
        match self {
            Self::Rotameric(m) => m.rotamer_energy(backbone, chi),
            Self::SemiRotameric(m) => m.rotamer_energy(backbone, chi),
        }
    }

    pub fn best_rotamer_energy(
        &self,
        backbone: &[f64],
        chi: &[f64],
        current_rotamer_only: bool,
    ) -> f64 {
        match self {
            Self::Rotameric(m) => m.best_rotamer_energy(backbone, chi, current_rotamer_only),
            Self::SemiRotameric(m) => m.best_rotamer_energy(backbone, chi, current_rotamer_only),
        }
    }

    pub fn sample_chi_sets(&self, backbone: &[f64]) -> Vec<Vec<f64>> {
        match self {
            Self::Rotameric(m) => m.sample_chi_sets(backbone),
            Self::SemiRotameric(m) => m.sample_chi_sets(backbone),
        }
    }

    pub fn memory_usage_in_bytes(&self) -> usize {
        match self {
            Self::Rotameric(m) => m.memory_usage_in_bytes(),
            Self::SemiRotameric(m) => m.memory_usage_in_bytes(),
        }
    }

    /// Self-describing serialization: a tag byte, then the variant body.
    pub fn write_binary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self {
            Self::Rotameric(m) => m.write_binary(out),
            Self::SemiRotameric(m) => m.write_binary(out),
        }
    }

    pub fn read_binary<R: Read>(aa: AminoAcid, input: &mut R) -> Result<Self, DunbrackError> {
        match read_u8(input, "model tag")? {
            1 => Ok(Self::Rotameric(RotamericModel::read_binary_body(
                aa, input,
            )?)),
            2 => Ok(Self::SemiRotameric(SemiRotamericModel::read_binary_body(
                aa, input,
            )?)),
            other => Err(DunbrackError::MalformedBinary(format!(
                "unknown model tag {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Three chi1 wells at the legacy boundaries, tabulated over a small
    /// phi/psi grid with bin-dependent probabilities.
    fn three_well_model(aa: AminoAcid, use_bicubic: bool) -> RotamericModel {
        let grid = BackboneGrid::new(vec![4, 4]);
        let mut bins = Vec::new();
        for bin in 0..grid.n_points() {
            let shift = bin as f64 * 0.01;
            bins.push(vec![
                record1(1, 0.5 + shift, 60.0, 8.0),
                record1(2, 0.3 - shift, 180.0, 9.0),
                record1(3, 0.2, -60.0, 10.0),
            ]);
        }
        RotamericModel::from_bins(aa, 1, grid, bins, use_bicubic, WellClassifier::Legacy02)
            .unwrap()
    }

    fn record1(well: u8, probability: f64, mean: f64, sd: f64) -> RotamerRecord {
        let mut wells = [0u8; MAX_CHI];
        wells[0] = well;
        let mut chi_mean = [0.0; MAX_CHI];
        chi_mean[0] = mean;
        let mut chi_sd = [1.0; MAX_CHI];
        chi_sd[0] = sd;
        RotamerRecord {
            wells,
            probability,
            chi_mean,
            chi_sd,
        }
    }

    mod grid {
        use super::*;

        #[test]
        fn flat_index_is_row_major() {
            let grid = BackboneGrid::new(vec![3, 4]);
            assert_eq!(grid.flat_index(&[0, 0]), 0);
            assert_eq!(grid.flat_index(&[0, 3]), 3);
            assert_eq!(grid.flat_index(&[2, 1]), 9);
            assert_eq!(grid.n_points(), 12);
        }

        #[test]
        fn continuous_coord_spans_the_circle() {
            let grid = BackboneGrid::new(vec![36]);
            assert!((grid.continuous_coord(0, -180.0)).abs() < 1e-12);
            assert!((grid.continuous_coord(0, -170.0) - 1.0).abs() < 1e-12);
            assert!((grid.continuous_coord(0, 170.0) - 35.0).abs() < 1e-12);
        }
    }

    mod classification {
        use super::*;

        #[test]
        fn mean_chi_round_trips_to_its_own_well() {
            let model = three_well_model(AminoAcid::Ser, false);
            let bb = [-180.0, -180.0];
            for packed in 0..model.n_packed_rotamers() {
                let record = *model.record(0, packed);
                let assigned = model.classify_wells(&bb, &record.chi_mean[..1]);
                assert_eq!(assigned.well(0), record.wells[0]);
            }
        }

        #[test]
        fn nearest_mean_classifier_round_trips_too() {
            let grid = BackboneGrid::new(vec![2, 2]);
            let bins = (0..4)
                .map(|_| {
                    vec![
                        record1(1, 0.6, 55.0, 8.0),
                        record1(2, 0.4, -170.0, 8.0),
                    ]
                })
                .collect();
            let model = RotamericModel::from_bins(
                AminoAcid::Ser,
                1,
                grid,
                bins,
                false,
                WellClassifier::NearestMean,
            )
            .unwrap();
            assert_eq!(model.classify_wells(&[0.0, 0.0], &[55.0]).well(0), 1);
            assert_eq!(model.classify_wells(&[0.0, 0.0], &[-170.0]).well(0), 2);
            // Circular distance: 175 is closer to -170 than to 55.
            assert_eq!(model.classify_wells(&[0.0, 0.0], &[175.0]).well(0), 2);
        }
    }

    mod energies {
        use super::*;

        #[test]
        fn energy_at_a_grid_point_matches_the_table() {
            let model = three_well_model(AminoAcid::Ser, false);
            let bb = [-180.0, -180.0];
            let e = model.rotamer_energy(&bb, &[60.0]);
            // chi sits exactly at the well mean, so only -ln(p) remains.
            assert!((e.value - (-(0.5f64).ln())).abs() < 1e-9);
        }

        #[test]
        fn probability_floor_prevents_infinite_energies() {
            let record = record1(1, 0.0, 60.0, 8.0);
            assert!(record.neg_log_probability().is_finite());
            assert!((record.neg_log_probability() - (-(PROB_FLOOR).ln())).abs() < 1e-12);
        }

        #[test]
        fn chi_deviation_raises_the_energy() {
            let model = three_well_model(AminoAcid::Ser, false);
            let bb = [-180.0, -180.0];
            let at_mean = model.rotamer_energy(&bb, &[60.0]).value;
            let off_mean = model.rotamer_energy(&bb, &[72.0]).value;
            assert!(off_mean > at_mean);
        }

        #[test]
        fn energy_is_periodic_in_backbone() {
            let model = three_well_model(AminoAcid::Ser, true);
            let a = model.rotamer_energy(&[-170.0, 33.0], &[60.0]).value;
            let b = model.rotamer_energy(&[190.0, 33.0 - 360.0], &[60.0]).value;
            assert!((a - b).abs() < 1e-9);
        }

        #[test]
        fn bicubic_energy_is_continuous_across_bin_boundaries() {
            let model = three_well_model(AminoAcid::Ser, true);
            let eps = 1e-7;
            // Bin boundary at phi = -90 for a 4-bin grid.
            let below = model.rotamer_energy(&[-90.0 - eps, 10.0], &[60.0]).value;
            let above = model.rotamer_energy(&[-90.0 + eps, 10.0], &[60.0]).value;
            assert!((below - above).abs() < 1e-5);
        }

        #[test]
        fn best_rotamer_energy_minimizes_over_wells() {
            let model = three_well_model(AminoAcid::Ser, false);
            let bb = [-180.0, -180.0];
            let best = model.best_rotamer_energy(&bb, &[60.0], false);
            assert!((best - (-(0.5f64).ln())).abs() < 1e-9);
            // current-only for the least likely well is higher than best.
            let current = model.best_rotamer_energy(&bb, &[-60.0], true);
            assert!(current > best);
        }

        #[test]
        fn backbone_derivative_matches_finite_differences() {
            let model = three_well_model(AminoAcid::Ser, true);
            let bb = [-73.0, 41.0];
            let h = 1e-5;
            let e = model.rotamer_energy(&bb, &[60.0]);
            let fd = (model.rotamer_energy(&[bb[0] + h, bb[1]], &[60.0]).value
                - model.rotamer_energy(&[bb[0] - h, bb[1]], &[60.0]).value)
                / (2.0 * h);
            assert!((e.d_bb[0] - fd).abs() < 1e-4);
        }
    }

    mod dimensions {
        use super::*;

        #[test]
        fn construction_succeeds_for_all_supported_dimension_pairs() {
            for n_chi in 1..=5usize {
                for n_bb in 1..=5usize {
                    let grid = BackboneGrid::new(vec![2; n_bb]);
                    let mut wells = [0u8; MAX_CHI];
                    for w in wells.iter_mut().take(n_chi) {
                        *w = 1;
                    }
                    let record = RotamerRecord {
                        wells,
                        probability: 1.0,
                        chi_mean: [60.0; MAX_CHI],
                        chi_sd: [8.0; MAX_CHI],
                    };
                    let bins = vec![vec![record]; grid.n_points()];
                    let model = RotamericModel::from_bins(
                        AminoAcid::Lys,
                        n_chi,
                        grid,
                        bins,
                        false,
                        WellClassifier::NearestMean,
                    );
                    assert!(model.is_ok(), "n_chi={n_chi} n_bb={n_bb}");
                }
            }
        }

        #[test]
        fn inconsistent_well_roster_is_rejected() {
            let grid = BackboneGrid::new(vec![2, 1]);
            let bins = vec![
                vec![record1(1, 0.6, 60.0, 8.0)],
                vec![record1(2, 0.6, 180.0, 8.0)],
            ];
            let err = RotamericModel::from_bins(
                AminoAcid::Ser,
                1,
                grid,
                bins,
                false,
                WellClassifier::Legacy02,
            )
            .unwrap_err();
            assert!(matches!(err, DunbrackError::InconsistentWells { .. }));
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn rotameric_binary_round_trip_is_exact() {
            let model = three_well_model(AminoAcid::Ser, true);
            let mut buf = Vec::new();
            model.write_binary(&mut buf).unwrap();
            let mut cur = Cursor::new(buf);
            let tag = read_u8(&mut cur, "tag").unwrap();
            assert_eq!(tag, 1);
            let reread = RotamericModel::read_binary_body(AminoAcid::Ser, &mut cur).unwrap();
            assert_eq!(model, reread);
        }

        #[test]
        fn semi_rotameric_binary_round_trip_is_exact() {
            let rotameric = three_well_model(AminoAcid::Asp, false);
            let n_points = rotameric.grid().n_points();
            let density: Vec<f64> = (0..n_points * 6).map(|k| (k as f64 * 0.1).sin()).collect();
            let model = SemiRotamericModel::new(
                rotameric,
                true,
                -90.0,
                6,
                density,
                vec![
                    NrchiWell { well: 1, left: -90.0, right: 0.0 },
                    NrchiWell { well: 2, left: 0.0, right: 90.0 },
                ],
            )
            .unwrap();

            let lib = SingleResidueDunbrackLibrary::SemiRotameric(model);
            let mut buf = Vec::new();
            lib.write_binary(&mut buf).unwrap();
            let mut cur = Cursor::new(buf);
            let reread = SingleResidueDunbrackLibrary::read_binary(AminoAcid::Asp, &mut cur).unwrap();
            assert_eq!(lib, reread);
        }

        #[test]
        fn truncated_body_is_reported_not_panicked() {
            let model = three_well_model(AminoAcid::Ser, false);
            let mut buf = Vec::new();
            model.write_binary(&mut buf).unwrap();
            buf.truncate(buf.len() / 2);
            let mut cur = Cursor::new(buf);
            let _tag = read_u8(&mut cur, "tag").unwrap();
            let err = RotamericModel::read_binary_body(AminoAcid::Ser, &mut cur).unwrap_err();
            assert!(matches!(err, DunbrackError::TruncatedBinary { .. }));
        }
    }

    mod semi_rotameric {
        use super::*;

        fn asp_model() -> SemiRotamericModel {
            let rotameric = three_well_model(AminoAcid::Asp, false);
            let n_points = rotameric.grid().n_points();
            // Terminal density favoring the center of the symmetric range.
            let density: Vec<f64> = (0..n_points)
                .flat_map(|_| [2.0, 1.0, 0.5, 1.0, 2.0, 3.0])
                .collect();
            SemiRotamericModel::new(
                rotameric,
                true,
                -90.0,
                6,
                density,
                vec![
                    NrchiWell { well: 1, left: -90.0, right: -30.0 },
                    NrchiWell { well: 2, left: -30.0, right: 30.0 },
                    NrchiWell { well: 3, left: 30.0, right: 90.0 },
                ],
            )
            .unwrap()
        }

        #[test]
        fn terminal_chi_respects_two_fold_symmetry() {
            let model = asp_model();
            let bb = [-180.0, -180.0];
            let a = model.rotamer_energy(&bb, &[60.0, 10.0]).value;
            let b = model.rotamer_energy(&bb, &[60.0, 190.0]).value;
            assert!((a - b).abs() < 1e-9);
        }

        #[test]
        fn terminal_well_classification_uses_the_definitions() {
            let model = asp_model();
            let bb = [-180.0, -180.0];
            assert_eq!(model.classify_wells(&bb, &[60.0, -60.0]).well(1), 1);
            assert_eq!(model.classify_wells(&bb, &[60.0, 0.0]).well(1), 2);
            assert_eq!(model.classify_wells(&bb, &[60.0, 45.0]).well(1), 3);
            // Boundary value just below the range end still classifies.
            assert_eq!(model.classify_wells(&bb, &[60.0, 89.99]).well(1), 3);
        }

        #[test]
        fn total_chi_count_includes_the_terminal_chi() {
            let model = asp_model();
            assert_eq!(model.n_chi(), 2);
        }
    }
}
