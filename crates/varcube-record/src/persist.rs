//! Persistence blocks: tagged auxiliary records appended to a snapshot.
//!
//! A block is a run of `(id, payload)` record pairs closed by the
//! sentinel id [`PERSIST_SENTINEL`]. Ids are looked up in the static
//! [`RECORD_TYPES`] table, which fixes each payload's symbolic name and
//! element kind. Real payloads are stored in the run's precision.

use std::io::Read;

use indexmap::IndexMap;
use tracing::{debug, warn};
use varcube_core::Precision;

use crate::codec::{decode_id, decode_ints, decode_reals, RecordReader};
use crate::error::RecordError;

/// Id that opens and closes a persistence block.
pub const PERSIST_SENTINEL: i32 = 2000;

/// Element kind of a persistent payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistKind {
    /// 4-byte signed integers.
    Int,
    /// Reals in the run's stored precision.
    Real,
}

/// One entry of the static persistent-record table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersistRecordType {
    /// Numeric id written before the payload.
    pub id: i32,
    /// Symbolic name the decoded value is stored under.
    pub name: &'static str,
    /// Payload element kind.
    pub kind: PersistKind,
}

const fn entry(id: i32, name: &'static str, kind: PersistKind) -> PersistRecordType {
    PersistRecordType { id, name, kind }
}

/// Known persistent records, ordered by id.
pub static RECORD_TYPES: &[PersistRecordType] = &[
    entry(1, "random_seeds", PersistKind::Int),
    entry(100, "forcing_location", PersistKind::Real),
    entry(101, "forcing_tsforce", PersistKind::Real),
    entry(102, "forcing_cont_phase", PersistKind::Real),
    entry(200, "hydro_phase", PersistKind::Real),
    entry(201, "hydro_location", PersistKind::Real),
    entry(202, "hydro_tsforce", PersistKind::Real),
    entry(300, "shear_delta_y", PersistKind::Real),
    entry(400, "magnetic_phase", PersistKind::Real),
    entry(401, "magnetic_tsforce", PersistKind::Real),
    entry(500, "noentropy_forcing_phase", PersistKind::Real),
    entry(600, "testfield_t_reinit", PersistKind::Real),
    entry(601, "testfield_n_reinit", PersistKind::Int),
    entry(700, "particles_seed", PersistKind::Int),
    entry(800, "dustdensity_nuc", PersistKind::Real),
];

/// Look up a persistent-record id in [`RECORD_TYPES`].
pub fn lookup_record_type(id: i32) -> Option<&'static PersistRecordType> {
    RECORD_TYPES.iter().find(|t| t.id == id)
}

/// A decoded persistent value.
#[derive(Clone, Debug, PartialEq)]
pub enum PersistValue {
    /// Integer payload.
    Int(Vec<i32>),
    /// Real payload, widened to `f64`.
    Real(Vec<f64>),
}

impl PersistValue {
    /// The first element as `f64`, if the payload is non-empty.
    pub fn first_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => v.first().map(|&i| f64::from(i)),
            Self::Real(v) => v.first().copied(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Real(v) => v.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode a persistence block from the records following the coordinate
/// record.
///
/// End of file before the first id means the snapshot has no persistent
/// data. End of file at an id boundary before the sentinel is tolerated
/// with a warning; end of file between an id and its payload is an error.
pub fn read_persist_block<R: Read>(
    reader: &mut RecordReader<R>,
    precision: Precision,
) -> Result<IndexMap<String, PersistValue>, RecordError> {
    let mut values = IndexMap::new();

    let Some(opening) = reader.next_record()? else {
        return Ok(values);
    };
    let mut id = decode_id(&opening)?;
    if id == PERSIST_SENTINEL {
        match next_id(reader)? {
            Some(next) => id = next,
            None => {
                warn!("persistence block opened but never closed");
                return Ok(values);
            }
        }
    }

    // Bounded: the table has far fewer entries than the sentinel value.
    for _ in 0..PERSIST_SENTINEL {
        if id == PERSIST_SENTINEL {
            return Ok(values);
        }
        let payload = reader.read_record("persistent payload")?;
        match lookup_record_type(id) {
            Some(ty) => {
                let value = match ty.kind {
                    PersistKind::Int => PersistValue::Int(decode_ints(&payload)?),
                    PersistKind::Real => PersistValue::Real(decode_reals(&payload, precision)?),
                };
                debug!(id, name = ty.name, len = value.len(), "persistent record");
                values.insert(ty.name.to_string(), value);
            }
            None => {
                debug!(id, bytes = payload.len(), "skipping unknown persistent record");
            }
        }
        match next_id(reader)? {
            Some(next) => id = next,
            None => {
                warn!(
                    decoded = values.len(),
                    "persistence block ended without sentinel"
                );
                return Ok(values);
            }
        }
    }
    Err(RecordError::malformed(
        "persistence block has no sentinel",
        PERSIST_SENTINEL as usize,
    ))
}

fn next_id<R: Read>(reader: &mut RecordReader<R>) -> Result<Option<i32>, RecordError> {
    reader
        .next_record()?
        .map(|bytes| decode_id(&bytes))
        .transpose()
}
