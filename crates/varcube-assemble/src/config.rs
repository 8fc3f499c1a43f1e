//! Read options, snapshot selection, and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use varcube_core::DimVariant;

// ── SnapshotSelector ───────────────────────────────────────────────

/// Which snapshot of a run to read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SnapshotSelector {
    /// The most recent snapshot (`var.dat` / `var.h5`).
    #[default]
    Latest,
    /// A numbered snapshot (`VAR<n>` / `VAR<n>.h5`).
    Index(u32),
    /// An explicit file name inside each processor directory.
    File(String),
}

impl SnapshotSelector {
    /// File name to open, for legacy or container runs.
    pub fn file_name(&self, container: bool) -> String {
        match (self, container) {
            (Self::Latest, false) => "var.dat".to_string(),
            (Self::Latest, true) => "var.h5".to_string(),
            (Self::Index(n), false) => format!("VAR{n}"),
            (Self::Index(n), true) => format!("VAR{n}.h5"),
            (Self::File(name), _) => name.clone(),
        }
    }

    /// Downsampled snapshots are written against their own dimensions.
    pub fn dim_variant(&self) -> DimVariant {
        match self {
            Self::File(name) if name.starts_with("VARd") => DimVariant::Downsampled,
            _ => DimVariant::Standard,
        }
    }

    /// Whether the snapshot exists before the run takes its first step.
    ///
    /// Only numbered snapshots past the first are refused for runs that
    /// have not started.
    pub fn is_initial(&self) -> bool {
        match self {
            Self::Latest => true,
            Self::Index(n) => *n == 0,
            Self::File(name) => !matches!(
                name.strip_prefix("VAR")
                    .map(|n| n.trim_start_matches('d'))
                    .and_then(|n| n.parse::<u32>().ok()),
                Some(n) if n > 0
            ),
        }
    }
}

// ── ProcSelector ───────────────────────────────────────────────────

/// Which processors to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcSelector {
    /// Every processor directory, stitched into the global grid.
    #[default]
    All,
    /// One processor's subdomain, returned as-is.
    Single(usize),
}

// ── ReadOptions ────────────────────────────────────────────────────

/// Options for one snapshot read.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Snapshot to read. Default: [`SnapshotSelector::Latest`].
    pub snapshot: SnapshotSelector,
    /// Processors to read. Default: [`ProcSelector::All`].
    pub proc: ProcSelector,
    /// Strip ghost cells after derivation. Default: false.
    pub trim: bool,
    /// Decode persistence blocks. Default: false.
    pub persist: bool,
    /// Fail the read on the first derived-field failure instead of
    /// recording it on the snapshot. Default: false.
    pub strict_derived: bool,
    /// Decode worker threads. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[1, 16]`).
    pub worker_count: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            snapshot: SnapshotSelector::Latest,
            proc: ProcSelector::All,
            trim: false,
            persist: false,
            strict_derived: false,
            worker_count: None,
        }
    }
}

impl ReadOptions {
    /// Resolve the worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2);
                (cpus / 2).clamp(1, 16)
            }
        }
    }
}

// ── CancelToken ────────────────────────────────────────────────────

/// Shared cancellation flag checked between subdomain reads.
///
/// Clones share the flag. Cancelling is permanent for the token.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
