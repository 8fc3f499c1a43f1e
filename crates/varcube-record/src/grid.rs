//! Binary grid records (`grid.dat`).
//!
//! Layout: record 1 is `t, x[mx], y[my], z[mz], dx, dy, dz`; records 2
//! and 3 hold box size and origin and are skipped; record 4 holds the
//! per-cell inverse spacings `dx_1[mx], dy_1[my], dz_1[mz]`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;
use varcube_core::{Grid, Precision};

use crate::block::CoordRecord;
use crate::codec::{decode_reals, RecordReader};
use crate::error::RecordError;

/// Decode a grid from `reader`.
///
/// Files that stop after the coordinate record are accepted; their
/// inverse spacings are filled from the scalar spacings.
pub fn read_grid<R: Read>(
    reader: R,
    precision: Precision,
    mx: usize,
    my: usize,
    mz: usize,
) -> Result<Grid, RecordError> {
    let mut records = RecordReader::new(reader);
    let values = records.read_reals::<f64>("grid coordinates", precision)?;
    let coords = CoordRecord::decode(&values, mx, my, mz, false)?;

    let mut inverse = None;
    for _ in 0..2 {
        if records.next_record()?.is_none() {
            break;
        }
    }
    if records.records_read() == 3 {
        if let Some(bytes) = records.next_record()? {
            let v = decode_reals(&bytes, precision)?;
            if v.len() != mx + my + mz {
                return Err(RecordError::malformed(
                    format!("inverse-spacing record has {} values, expected {}", v.len(), mx + my + mz),
                    v.len(),
                ));
            }
            inverse = Some(v);
        }
    }

    let (dx_1, dy_1, dz_1) = match inverse {
        Some(v) => {
            let (a, rest) = v.split_at(mx);
            let (b, c) = rest.split_at(my);
            (a.to_vec(), b.to_vec(), c.to_vec())
        }
        None => {
            debug!("grid record has no inverse spacings, using scalar spacing");
            (
                vec![inverse_of(coords.dx); mx],
                vec![inverse_of(coords.dy); my],
                vec![inverse_of(coords.dz); mz],
            )
        }
    };

    Ok(Grid {
        x: coords.x,
        y: coords.y,
        z: coords.z,
        dx: coords.dx,
        dy: coords.dy,
        dz: coords.dz,
        dx_1,
        dy_1,
        dz_1,
    })
}

/// Open `path` and decode a grid from it.
pub fn read_grid_file(
    path: &Path,
    precision: Precision,
    mx: usize,
    my: usize,
    mz: usize,
) -> Result<Grid, RecordError> {
    let file = File::open(path)?;
    read_grid(BufReader::new(file), precision, mx, my, mz)
}

fn inverse_of(d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else {
        1.0 / d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use varcube_test_utils::RecordWriter;

    fn first_record(mx: usize, my: usize, mz: usize) -> Vec<f64> {
        let mut v = vec![0.0];
        v.extend((0..mx).map(|i| i as f64 * 0.5));
        v.extend((0..my).map(|i| i as f64 * 0.25));
        v.extend((0..mz).map(|i| i as f64));
        v.extend([0.5, 0.25, 1.0]);
        v
    }

    #[test]
    fn reads_all_four_records() {
        let mut w = RecordWriter::new(Vec::new());
        w.write_reals(&first_record(2, 2, 1), Precision::Double).unwrap();
        w.write_reals(&[1.0, 0.5, 1.0], Precision::Double).unwrap();
        w.write_reals(&[0.0, 0.0, 0.0], Precision::Double).unwrap();
        w.write_reals(&[2.0, 2.5, 4.0, 4.5, 1.0], Precision::Double).unwrap();
        let buf = w.into_inner();

        let g = read_grid(buf.as_slice(), Precision::Double, 2, 2, 1).unwrap();
        assert_eq!(g.x, vec![0.0, 0.5]);
        assert_eq!(g.dy, 0.25);
        assert_eq!(g.dx_1, vec![2.0, 2.5]);
        assert_eq!(g.dy_1, vec![4.0, 4.5]);
        assert_eq!(g.dz_1, vec![1.0]);
    }

    #[test]
    fn missing_inverse_record_falls_back_to_scalar_spacing() {
        let mut w = RecordWriter::new(Vec::new());
        w.write_reals(&first_record(2, 1, 1), Precision::Single).unwrap();
        let buf = w.into_inner();

        let g = read_grid(buf.as_slice(), Precision::Single, 2, 1, 1).unwrap();
        assert_eq!(g.dx_1, vec![2.0, 2.0]);
        assert_eq!(g.dy_1, vec![4.0]);
    }

    #[test]
    fn wrong_inverse_length_is_malformed() {
        let mut w = RecordWriter::new(Vec::new());
        w.write_reals(&first_record(1, 1, 1), Precision::Double).unwrap();
        w.write_reals(&[1.0; 3], Precision::Double).unwrap();
        w.write_reals(&[0.0; 3], Precision::Double).unwrap();
        w.write_reals(&[1.0; 4], Precision::Double).unwrap();
        let buf = w.into_inner();
        assert!(matches!(
            read_grid(buf.as_slice(), Precision::Double, 1, 1, 1),
            Err(RecordError::MalformedRecord { count: 4, .. })
        ));
    }
}
