//! Run metadata and the [`MetadataSource`] seam.
//!
//! Resolving dimensions, parameters, and the field index is the job of a
//! [`MetadataSource`]. The reader only consumes what it returns; how the
//! data gets there (text files, a database, a test fixture) is up to the
//! implementation.

use std::path::Path;

use crate::dims::Dims;
use crate::error::MetadataError;
use crate::index::FieldIndex;
use crate::params::RunParams;

/// Which dimension record a snapshot was written against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DimVariant {
    /// Full-resolution snapshots.
    #[default]
    Standard,
    /// Downsampled snapshots (`VARd<N>` files).
    Downsampled,
}

/// Grid coordinates and inverse spacings.
///
/// Non-uniform grids carry per-cell inverse spacings (`dx_1` and friends),
/// which derivative operators prefer over the scalar spacing.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    /// x coordinates including ghosts.
    pub x: Vec<f64>,
    /// y coordinates including ghosts.
    pub y: Vec<f64>,
    /// z coordinates including ghosts.
    pub z: Vec<f64>,
    /// Nominal x spacing.
    pub dx: f64,
    /// Nominal y spacing.
    pub dy: f64,
    /// Nominal z spacing.
    pub dz: f64,
    /// Inverse x spacing per cell.
    pub dx_1: Vec<f64>,
    /// Inverse y spacing per cell.
    pub dy_1: Vec<f64>,
    /// Inverse z spacing per cell.
    pub dz_1: Vec<f64>,
}

/// Everything the reader needs to know about one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunMetadata {
    /// Global dimensions.
    pub dims: Dims,
    /// Run parameters.
    pub params: RunParams,
    /// Field-name index.
    pub index: FieldIndex,
}

impl RunMetadata {
    /// Slots per snapshot, honouring the auxiliary-output flag.
    pub fn total_vars(&self) -> usize {
        self.dims.total_vars(self.params.write_aux)
    }
}

/// Source of run metadata for a data directory.
///
/// Implementations must be cheap to call repeatedly or be wrapped in a
/// cache; a single read queries them several times.
pub trait MetadataSource: Send + Sync {
    /// Global metadata for the run rooted at `datadir`.
    fn run_metadata(
        &self,
        datadir: &Path,
        variant: DimVariant,
    ) -> Result<RunMetadata, MetadataError>;

    /// Dimensions of the subdomain written by processor `proc`.
    fn proc_dims(
        &self,
        datadir: &Path,
        proc: usize,
        variant: DimVariant,
    ) -> Result<Dims, MetadataError>;

    /// Grid coordinates and spacings.
    ///
    /// Returns [`MetadataError::MissingGridMetadata`] when the run has no
    /// grid record; callers fall back to a uniform grid.
    fn grid(&self, datadir: &Path, dims: &Dims) -> Result<Grid, MetadataError>;
}
