//! Decoding one legacy snapshot file into a [`RawBlock`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;
use varcube_core::{Precision, Real};

use crate::codec::{decode_reals, decode_reals_as, RecordReader};
use crate::error::RecordError;
use crate::persist::{read_persist_block, PersistValue};

/// The coordinate record that follows the field tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordRecord {
    /// Simulation time.
    pub t: f64,
    /// x coordinates, ghosts included.
    pub x: Vec<f64>,
    /// y coordinates, ghosts included.
    pub y: Vec<f64>,
    /// z coordinates, ghosts included.
    pub z: Vec<f64>,
    /// Grid spacing along x.
    pub dx: f64,
    /// Grid spacing along y.
    pub dy: f64,
    /// Grid spacing along z.
    pub dz: f64,
    /// Shearing-box offset, present only for sheared runs.
    pub deltay: Option<f64>,
}

impl CoordRecord {
    /// Split a decoded coordinate record.
    ///
    /// The record holds `t, x[mx], y[my], z[mz], dx, dy, dz` followed by
    /// `deltay` when `shear` is set. Any other length is malformed.
    pub fn decode(
        values: &[f64],
        mx: usize,
        my: usize,
        mz: usize,
        shear: bool,
    ) -> Result<Self, RecordError> {
        let expected = mx + my + mz + 4 + usize::from(shear);
        if values.len() != expected {
            return Err(RecordError::malformed(
                format!(
                    "coordinate record has {} values, expected {expected} for {mx}x{my}x{mz}{}",
                    values.len(),
                    if shear { " with shear" } else { "" }
                ),
                values.len(),
            ));
        }
        let (t, rest) = (values[0], &values[1..]);
        let (x, rest) = rest.split_at(mx);
        let (y, rest) = rest.split_at(my);
        let (z, tail) = rest.split_at(mz);
        Ok(Self {
            t,
            x: x.to_vec(),
            y: y.to_vec(),
            z: z.to_vec(),
            dx: tail[0],
            dy: tail[1],
            dz: tail[2],
            deltay: shear.then(|| tail[3]),
        })
    }
}

/// What the reader needs to know to decode one subdomain file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSpec {
    /// Stored precision.
    pub precision: Precision,
    /// Local x extent, ghosts included.
    pub mx: usize,
    /// Local y extent.
    pub my: usize,
    /// Local z extent.
    pub mz: usize,
    /// Cells in one variable slot (depends on the storage layout).
    pub cells: usize,
    /// Variable slots stored in the file.
    pub total_vars: usize,
    /// Whether the coordinate record carries `deltay`.
    pub shear: bool,
    /// Whether to decode the trailing persistence block.
    pub read_persist: bool,
}

/// One decoded subdomain: flat field data plus coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBlock<T> {
    /// Field tensor, flattened `variables × spatial` in storage order.
    pub data: Vec<T>,
    /// Number of variable slots in `data`.
    pub vars: usize,
    /// Coordinate record.
    pub coords: CoordRecord,
    /// Persistent values, empty unless requested.
    pub persist: IndexMap<String, PersistValue>,
}

/// Decode a legacy snapshot from `reader`.
pub fn read_block<T: Real, R: Read>(reader: R, spec: &BlockSpec) -> Result<RawBlock<T>, RecordError> {
    let mut records = RecordReader::new(reader);

    let bytes = records.read_record("field tensor")?;
    let data: Vec<T> = decode_reals_as(&bytes, spec.precision)?;
    let expected = spec.total_vars * spec.cells;
    if spec.cells == 0 || data.len() % spec.cells != 0 || data.len() != expected {
        return Err(RecordError::malformed(
            format!(
                "field tensor has {} elements, expected {} vars x {} cells = {expected}",
                data.len(),
                spec.total_vars,
                spec.cells
            ),
            data.len(),
        ));
    }

    let bytes = records.read_record("coordinates")?;
    let values = decode_reals(&bytes, spec.precision)?;
    let coords = CoordRecord::decode(&values, spec.mx, spec.my, spec.mz, spec.shear)?;

    let persist = if spec.read_persist {
        read_persist_block(&mut records, spec.precision)?
    } else {
        IndexMap::new()
    };

    Ok(RawBlock {
        data,
        vars: spec.total_vars,
        coords,
        persist,
    })
}

/// Open `path`, decode it, and close it.
pub fn read_block_file<T: Real>(path: &Path, spec: &BlockSpec) -> Result<RawBlock<T>, RecordError> {
    let block = {
        let file = File::open(path)?;
        read_block(BufReader::new(file), spec)?
    };
    debug!(
        path = %path.display(),
        vars = block.vars,
        t = block.coords.t,
        "decoded snapshot block"
    );
    Ok(block)
}
