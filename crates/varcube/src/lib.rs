//! varcube: a reader for partitioned grid-simulation snapshots.
//!
//! A run partitions its domain across processors and writes one
//! ghost-padded snapshot file per processor (or one collective file).
//! This facade turns a data directory into a single [`Snapshot`]:
//! metadata is resolved, the on-disk layout detected, subdomains
//! stitched into the global grid, requested derived fields computed,
//! and ghost cells optionally trimmed.
//!
//! # Quick start
//!
//! ```no_run
//! use varcube::prelude::*;
//!
//! let request = ReadRequest::new("data")
//!     .snapshot(SnapshotSelector::Index(3))
//!     .derive([DerivedField::Bb, DerivedField::Pp])
//!     .trim(true);
//! let snap: Snapshot<f64> = read_var(&request)?;
//! println!("t = {}, f shape = {:?}", snap.t(), snap.f().shape());
//! # Ok::<(), varcube::VarError>(())
//! ```
//!
//! Repeated reads of the same run should go through a [`VarReader`],
//! which keeps the metadata cache, container backend, and cancellation
//! token between calls.
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `varcube-core` | Dimensions, layouts, field index, run parameters |
//! | [`record`] | `varcube-record` | Length-framed record decoding |
//! | [`assemble`] | `varcube-assemble` | Detection, metadata, stitching, snapshots |
//! | [`derive`] | `varcube-derive` | Curl operators and derived fields |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod reader;

pub use error::VarError;
pub use reader::{read_var, ReadRequest, VarReader};

/// Core types (`varcube-core`).
///
/// [`types::Dims`], [`types::Layout`], [`types::FieldIndex`], and the
/// [`types::MetadataSource`] seam.
pub use varcube_core as types;

/// Record decoding (`varcube-record`).
pub use varcube_record as record;

/// Detection, metadata resolution, stitching, and the snapshot type
/// (`varcube-assemble`).
pub use varcube_assemble as assemble;

/// Derived fields and curl operators (`varcube-derive`).
pub use varcube_derive as derive;

pub use varcube_assemble::Snapshot;

/// Common imports for typical usage.
///
/// ```rust
/// use varcube::prelude::*;
/// ```
pub mod prelude {
    // Entry points
    pub use crate::{read_var, ReadRequest, VarError, VarReader};

    // Read configuration
    pub use varcube_assemble::{CancelToken, ProcSelector, ReadOptions, SnapshotSelector};

    // Snapshots
    pub use varcube_assemble::{InteriorBounds, Snapshot};

    // Derived fields
    pub use varcube_derive::{CentralCurl, CurlOperator, DerivationReport, DerivedField};

    // Core types
    pub use varcube_core::{Layout, Precision, Real};

    // Errors
    pub use varcube_assemble::{ReadError, TrimError};
    pub use varcube_core::DeriveError;
}
