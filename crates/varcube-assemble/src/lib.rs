//! Snapshot assembly for partitioned grid runs.
//!
//! Turns a run directory into one [`Snapshot`]: metadata is resolved
//! (and memoized in a caller-owned [`MetadataCache`]), the on-disk
//! layout is detected, and the matching [`AssembleStrategy`] reads and
//! places every subdomain.
//!
//! ```text
//!   plan_read ─▶ AssemblePlan ─▶ assemble ─┬─ LegacyStrategy     (proc<N>/ or allprocs/ records)
//!                                          └─ ContainerStrategy  (allprocs/*.h5)
//! ```
//!
//! Legacy subdomain files are decoded on a scoped worker pool; placement
//! into the global tensor happens on the calling thread in natural
//! processor order.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod container;
pub mod detect;
pub mod error;
pub mod metadata;
pub mod plan;
pub mod snapshot;
pub mod stitch;
mod worker;

pub use config::{CancelToken, ProcSelector, ReadOptions, SnapshotSelector};
#[cfg(feature = "hdf5")]
pub use container::Hdf5Backend;
pub use container::{
    Container, ContainerBackend, ContainerError, ContainerStrategy, MemoryBackend, MemoryContainer,
};
pub use detect::{detect_strategy, natural_sort, ProcDir, ReadStrategy};
pub use error::ReadError;
pub use metadata::{FileMetadata, MetadataCache, StaticMetadata};
pub use plan::{assemble, default_backend, plan_read};
pub use snapshot::{FieldView, InteriorBounds, Snapshot, SnapshotParts, TrimError};
pub use stitch::{
    axis_placement, AssemblePlan, AssembleStrategy, AxisPlacement, GlobalAssembly, LegacyStrategy,
    SubdomainDescriptor,
};
