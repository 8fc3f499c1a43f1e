//! Error types shared across the workspace.
//!
//! [`MetadataError`] covers metadata resolution; [`DeriveError`] covers
//! derived-field computation and is scoped to a single derived field.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::params::CoordinateSystem;

/// Errors from resolving run metadata.
#[derive(Debug)]
pub enum MetadataError {
    /// A metadata file could not be read.
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A metadata file is present but could not be parsed.
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
    /// No dimension record exists for the requested processor.
    UnknownProcessor {
        /// The processor that was asked for.
        proc: usize,
    },
    /// The run has no grid record.
    ///
    /// Recoverable: readers assume a uniform grid built from the snapshot's
    /// own spacings.
    MissingGridMetadata {
        /// Where the grid record was expected.
        path: PathBuf,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read {}: {source}", path.display())
            }
            Self::Parse { path, detail } => {
                write!(f, "cannot parse {}: {detail}", path.display())
            }
            Self::UnknownProcessor { proc } => {
                write!(f, "no dimension record for processor {proc}")
            }
            Self::MissingGridMetadata { path } => {
                write!(f, "grid metadata missing at {}", path.display())
            }
        }
    }
}

impl Error for MetadataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from computing one derived field.
///
/// A failure here never aborts derivation of other requested fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeriveError {
    /// A prerequisite field is absent from the snapshot.
    MissingField {
        /// The derived field being computed.
        field: &'static str,
        /// The prerequisite(s) that were missing.
        missing: &'static str,
    },
    /// The curl operator only supports Cartesian grids.
    UnsupportedCoordinates {
        /// The derived field being computed.
        field: &'static str,
        /// The run's coordinate system.
        system: CoordinateSystem,
    },
    /// Input arrays do not have the shape the operator needs.
    ShapeMismatch {
        /// Description of the mismatch.
        detail: String,
    },
}

impl fmt::Display for DeriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, missing } => {
                write!(f, "cannot derive '{field}': missing {missing}")
            }
            Self::UnsupportedCoordinates { field, system } => {
                write!(f, "cannot derive '{field}' on a {system} grid")
            }
            Self::ShapeMismatch { detail } => write!(f, "shape mismatch: {detail}"),
        }
    }
}

impl Error for DeriveError {}
