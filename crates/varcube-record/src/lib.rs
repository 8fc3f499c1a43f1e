//! Record decoding for legacy grid snapshots.
//!
//! Legacy snapshots are sequences of length-framed records with no
//! self-describing schema: the reader has to know from run metadata what
//! each record holds.
//!
//! # Format
//!
//! ```text
//! [u32 len][payload ...][u32 len]   repeated
//!
//! record 1: f[vars][z][y][x]             (stored precision)
//! record 2: t x[mx] y[my] z[mz] dx dy dz [deltay]
//! record 3+: persistence block (optional)
//!     [2000] ([id] [payload])* [2000]
//! ```
//!
//! - [`RecordReader`] walks the framing over any `Read` source
//! - [`read_block`] decodes one subdomain file into a [`RawBlock`]
//! - [`read_persist_block`] decodes the tagged persistence records
//! - [`read_grid`] decodes a binary grid record into a [`Grid`](varcube_core::Grid)

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod codec;
pub mod error;
pub mod grid;
pub mod persist;

pub use block::{read_block, read_block_file, BlockSpec, CoordRecord, RawBlock};
pub use codec::RecordReader;
pub use error::RecordError;
pub use grid::{read_grid, read_grid_file};
pub use persist::{
    lookup_record_type, read_persist_block, PersistKind, PersistRecordType, PersistValue,
    PERSIST_SENTINEL, RECORD_TYPES,
};

/// Size of the length marker framing each record, in bytes.
pub const MARKER_BYTES: usize = 4;
