use super::error::PackError;
use crate::core::models::aa::AminoAcid;

/// What the packer may do at one residue position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionSpec {
    /// Keep the input conformation; the position enters the interaction
    /// graph with exactly one candidate rotamer.
    Fixed,
    /// Re-place the side chain of the input amino acid.
    Repack,
    /// Re-place the side chain, choosing among the listed amino acids.
    Design(Vec<AminoAcid>),
}

/// Which interaction-graph representation to instantiate.
///
/// `Auto` defers to the factory's cost model; the other variants are
/// explicit overrides that bypass the time estimates entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgRequest {
    #[default]
    Auto,
    Precomputed,
    Lazy,
    DoubleLazy,
    LinearMemory,
}

/// A per-residue-pair multiplier applied to two-body energies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeReweight {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

/// Everything the packer needs to know about one job besides the pose:
/// per-position behavior, the graph request, and resource knobs.
#[derive(Debug, Clone)]
pub struct PackerTask {
    positions: Vec<PositionSpec>,
    ig_request: IgRequest,
    threads: usize,
    linmem_history_size: usize,
    double_lazy_memory_limit: Option<usize>,
    edge_reweights: Vec<EdgeReweight>,
}

impl PackerTask {
    /// A task that repacks every position.
    pub fn repack_all(n_positions: usize) -> Self {
        Self {
            positions: vec![PositionSpec::Repack; n_positions],
            ig_request: IgRequest::Auto,
            threads: 1,
            linmem_history_size: 10,
            double_lazy_memory_limit: None,
            edge_reweights: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> &PositionSpec {
        &self.positions[index]
    }

    pub fn set_position(
        &mut self,
        index: usize,
        spec: PositionSpec,
    ) -> Result<&mut Self, PackError> {
        if index >= self.positions.len() {
            return Err(PackError::InvalidPosition {
                index,
                len: self.positions.len(),
            });
        }
        if let PositionSpec::Design(palette) = &spec {
            if palette.is_empty() {
                return Err(PackError::EmptyDesignPalette { index });
            }
        }
        self.positions[index] = spec;
        Ok(self)
    }

    pub fn fix_position(&mut self, index: usize) -> Result<&mut Self, PackError> {
        self.set_position(index, PositionSpec::Fixed)
    }

    pub fn ig_request(&self) -> IgRequest {
        self.ig_request
    }

    pub fn set_ig_request(&mut self, request: IgRequest) -> &mut Self {
        self.ig_request = request;
        self
    }

    /// Thread count assumed by the factory's precomputation time estimate.
    /// The parallel table fill itself draws on the global rayon pool when
    /// the `parallel` feature is enabled; this knob does not resize it.
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn set_threads(&mut self, threads: usize) -> Result<&mut Self, PackError> {
        if threads == 0 {
            return Err(PackError::InvalidParameter {
                name: "threads",
                message: "must be at least 1".to_string(),
            });
        }
        self.threads = threads;
        Ok(self)
    }

    /// Per-edge history depth for the linear-memory representation.
    pub fn linmem_history_size(&self) -> usize {
        self.linmem_history_size
    }

    pub fn set_linmem_history_size(&mut self, size: usize) -> Result<&mut Self, PackError> {
        if size == 0 {
            return Err(PackError::InvalidParameter {
                name: "linmem_history_size",
                message: "must be at least 1".to_string(),
            });
        }
        self.linmem_history_size = size;
        Ok(self)
    }

    /// Byte cap on retained edge tables for the double-lazy representation;
    /// `None` never evicts.
    pub fn double_lazy_memory_limit(&self) -> Option<usize> {
        self.double_lazy_memory_limit
    }

    pub fn set_double_lazy_memory_limit(&mut self, bytes: Option<usize>) -> &mut Self {
        self.double_lazy_memory_limit = bytes;
        self
    }

    pub fn edge_reweights(&self) -> &[EdgeReweight] {
        &self.edge_reweights
    }

    /// Registers a two-body multiplier for one residue pair. Stored with
    /// the lower residue index first so lookups are order-insensitive.
    pub fn add_edge_reweight(
        &mut self,
        resid_a: usize,
        resid_b: usize,
        weight: f64,
    ) -> Result<&mut Self, PackError> {
        let len = self.positions.len();
        for index in [resid_a, resid_b] {
            if index >= len {
                return Err(PackError::InvalidPosition { index, len });
            }
        }
        self.edge_reweights.push(EdgeReweight {
            lower: resid_a.min(resid_b),
            upper: resid_a.max(resid_b),
            weight,
        });
        Ok(self)
    }

    /// Whether any position may change amino acid identity.
    pub fn design_any(&self) -> bool {
        self.positions
            .iter()
            .any(|spec| matches!(spec, PositionSpec::Design(_)))
    }

    /// Indices of positions the packer may move, in pose order.
    pub fn packable_positions(&self) -> Vec<usize> {
        self.positions
            .iter()
            .enumerate()
            .filter(|(_, spec)| !matches!(spec, PositionSpec::Fixed))
            .map(|(i, _)| i)
            .collect()
    }
}
