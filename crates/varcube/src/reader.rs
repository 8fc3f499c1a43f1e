//! [`ReadRequest`], [`VarReader`], and [`read_var`].

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use varcube_assemble::{
    assemble, default_backend, plan_read, CancelToken, ContainerBackend, MetadataCache,
    ProcSelector, ReadOptions, Snapshot, SnapshotSelector,
};
use varcube_core::{MetadataSource, Real};
use varcube_derive::{derive_fields, parse_fields, CentralCurl, CurlOperator, DerivedField};

use crate::error::VarError;

// ── ReadRequest ────────────────────────────────────────────────────

/// One snapshot read: where, which snapshot, and what to derive.
#[derive(Clone, Debug)]
pub struct ReadRequest {
    /// Run data directory.
    pub datadir: PathBuf,
    /// Snapshot, processor, trimming, and worker options.
    pub options: ReadOptions,
    /// Derived fields to compute before trimming.
    pub derived: Vec<DerivedField>,
}

impl ReadRequest {
    /// Read the latest snapshot of the run in `datadir` with default
    /// options.
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            options: ReadOptions::default(),
            derived: Vec::new(),
        }
    }

    /// Select the snapshot to read.
    pub fn snapshot(mut self, snapshot: SnapshotSelector) -> Self {
        self.options.snapshot = snapshot;
        self
    }

    /// Select the processors to read.
    pub fn proc(mut self, proc: ProcSelector) -> Self {
        self.options.proc = proc;
        self
    }

    /// Strip ghost cells after derivation.
    pub fn trim(mut self, on: bool) -> Self {
        self.options.trim = on;
        self
    }

    /// Decode persistence blocks.
    pub fn persist(mut self, on: bool) -> Self {
        self.options.persist = on;
        self
    }

    /// Fail the read on the first derived-field failure.
    pub fn strict_derived(mut self, on: bool) -> Self {
        self.options.strict_derived = on;
        self
    }

    /// Number of decode workers.
    pub fn workers(mut self, n: usize) -> Self {
        self.options.worker_count = Some(n);
        self
    }

    /// Add derived fields.
    pub fn derive(mut self, fields: impl IntoIterator<Item = DerivedField>) -> Self {
        self.derived.extend(fields);
        self
    }

    /// Add derived fields by tag (`"bb"`, `"pp"`, ...).
    pub fn derive_tags<'a>(self, tags: impl IntoIterator<Item = &'a str>) -> Result<Self, VarError> {
        let fields = parse_fields(tags)?;
        Ok(self.derive(fields))
    }
}

// ── VarReader ──────────────────────────────────────────────────────

/// A reading session: metadata cache, container backend, curl operator,
/// and cancellation token reused across reads.
pub struct VarReader<C = CentralCurl> {
    cache: MetadataCache,
    backend: Option<Box<dyn ContainerBackend>>,
    curl: C,
    cancel: CancelToken,
}

impl Default for VarReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VarReader {
    /// File-based metadata, the default container backend for this
    /// build, and [`CentralCurl`].
    pub fn new() -> Self {
        Self {
            cache: MetadataCache::default(),
            backend: default_backend(),
            curl: CentralCurl,
            cancel: CancelToken::new(),
        }
    }
}

impl<C> VarReader<C> {
    /// Resolve metadata through `source` instead of the run's files.
    pub fn with_metadata(mut self, source: impl MetadataSource + 'static) -> Self {
        self.cache = MetadataCache::new(source);
        self
    }

    /// Use `backend` for container snapshots.
    pub fn with_backend(mut self, backend: impl ContainerBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Use `curl` for vector-calculus fields.
    pub fn with_curl<D>(self, curl: D) -> VarReader<D> {
        VarReader {
            cache: self.cache,
            backend: self.backend,
            curl,
            cancel: self.cancel,
        }
    }

    /// Share `cancel` with the caller.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The session's cancellation token. Cancelling it aborts the read
    /// in progress and every later one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drop cached metadata for `datadir`. Returns whether anything was
    /// cached.
    pub fn invalidate(&mut self, datadir: &Path) -> bool {
        self.cache.invalidate(datadir)
    }

    /// The metadata cache.
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Plan, assemble, derive, and trim one snapshot.
    pub fn read<T: Real>(&mut self, request: &ReadRequest) -> Result<Snapshot<T>, VarError>
    where
        C: CurlOperator<T>,
    {
        let opts = &request.options;
        let plan = plan_read(&request.datadir, opts, &mut self.cache)?;
        let mut snap: Snapshot<T> = assemble(&plan, self.backend.as_deref(), &self.cancel)?;

        if !request.derived.is_empty() {
            let report = derive_fields(&mut snap, &request.derived, &self.curl);
            debug!(%report, "derived fields");
            if opts.strict_derived {
                if let Some((field, source)) = report.first_failure() {
                    return Err(VarError::Derive {
                        field,
                        source: source.clone(),
                    });
                }
            }
        }
        if opts.trim {
            snap.trim()?;
        }

        info!(
            datadir = %request.datadir.display(),
            shape = ?snap.f().shape(),
            derived = snap.derived().len(),
            trimmed = snap.is_trimmed(),
            "snapshot read"
        );
        Ok(snap)
    }
}

impl<C> fmt::Debug for VarReader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarReader")
            .field("cache", &self.cache)
            .field("backend", &self.backend.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Read one snapshot with a fresh [`VarReader`].
pub fn read_var<T: Real>(request: &ReadRequest) -> Result<Snapshot<T>, VarError> {
    VarReader::new().read(request)
}
