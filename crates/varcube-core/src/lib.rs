//! Core types and traits for the varcube snapshot reader.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: grid dimensions
//! and storage layouts, the field-name index, run parameters, the
//! [`MetadataSource`] seam, and the error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dims;
pub mod error;
pub mod index;
pub mod metadata;
pub mod params;
pub mod real;

pub use dims::{Dims, Layout, Precision, SpatialAxis};
pub use error::{DeriveError, MetadataError};
pub use index::{FieldIndex, VectorGroup};
pub use metadata::{DimVariant, Grid, MetadataSource, RunMetadata};
pub use params::{CoordinateSystem, EosConstants, RunParams};
pub use real::Real;
