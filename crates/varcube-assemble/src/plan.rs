//! Resolving a read into an [`AssemblePlan`] and running it.

use std::path::Path;

use tracing::{debug, info, warn};
use varcube_core::{DimVariant, Layout, MetadataError, Real};

use crate::config::{CancelToken, ProcSelector, ReadOptions};
use crate::container::{ContainerBackend, ContainerStrategy};
use crate::detect::{detect_strategy, snapshot_dirs, ReadStrategy};
use crate::error::ReadError;
use crate::metadata::MetadataCache;
use crate::snapshot::Snapshot;
use crate::stitch::{AssemblePlan, AssembleStrategy, LegacyStrategy, SubdomainDescriptor};

/// File whose presence marks a run that has taken at least one step.
pub const STARTED_MARKER: &str = "time_series.dat";

/// Resolve metadata, the read strategy, and the files to read.
///
/// Nothing is decoded yet. Legacy snapshot files are checked for
/// existence here so a missing file fails before any allocation.
pub fn plan_read(
    datadir: &Path,
    opts: &ReadOptions,
    cache: &mut MetadataCache,
) -> Result<AssemblePlan, ReadError> {
    if !opts.snapshot.is_initial() && !datadir.join(STARTED_MARKER).exists() {
        let requested = opts.snapshot.file_name(false);
        info!(datadir = %datadir.display(), snapshot = %requested, "run has not started");
        return Err(ReadError::RunNotStarted { requested });
    }

    let variant = opts.snapshot.dim_variant();
    let metadata = cache.run(datadir, variant)?;
    let strategy = detect_strategy(datadir, &metadata.params)?;
    if let (ProcSelector::Single(proc), false) =
        (opts.proc, strategy == ReadStrategy::LegacyPerProcess)
    {
        warn!(proc, ?strategy, "processor selection ignored for collective snapshots");
    }

    let file_name = opts.snapshot.file_name(strategy.is_container());
    let dirs = snapshot_dirs(datadir, strategy, opts.proc)?;
    let mut subdomains = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let path = datadir.join(&dir.name).join(&file_name);
        if !strategy.is_container() && !path.is_file() {
            return Err(ReadError::FileNotFound { path });
        }
        let dims = match dir.proc {
            Some(n) => cache.proc_dims(datadir, n, variant)?,
            None => metadata.dims.clone(),
        };
        subdomains.push(SubdomainDescriptor { dir, path, dims });
    }

    // grid.dat describes the full-resolution grid only.
    let grid = match variant {
        DimVariant::Standard => match cache.grid(datadir, variant) {
            Ok(grid) => grid,
            Err(e @ MetadataError::Parse { .. }) => {
                warn!(error = %e, "unreadable grid record, ignoring it");
                None
            }
            Err(e) => return Err(e.into()),
        },
        DimVariant::Downsampled => None,
    };
    if grid.is_none() {
        warn!(
            datadir = %datadir.display(),
            "no grid metadata, assuming uniform spacing from the snapshot's dx, dy, dz"
        );
    }

    let plan = AssemblePlan {
        datadir: datadir.to_path_buf(),
        strategy,
        layout: Layout::for_run(metadata.params.write_2d, &metadata.dims),
        metadata,
        subdomains,
        persist: opts.persist,
        workers: opts.resolved_worker_count(),
        grid,
    };
    debug!(
        ?strategy,
        file = %file_name,
        subdomains = plan.subdomains.len(),
        workers = plan.workers,
        "planned snapshot read"
    );
    Ok(plan)
}

/// The container backend compiled into this build, if any.
pub fn default_backend() -> Option<Box<dyn ContainerBackend>> {
    #[cfg(feature = "hdf5")]
    {
        Some(Box::new(crate::container::Hdf5Backend))
    }
    #[cfg(not(feature = "hdf5"))]
    {
        None
    }
}

/// Run `plan` with the strategy it was detected for.
///
/// Container runs need a `backend`; without one they fail with
/// [`ReadError::UnsupportedFormat`].
pub fn assemble<T: Real>(
    plan: &AssemblePlan,
    backend: Option<&dyn ContainerBackend>,
    cancel: &CancelToken,
) -> Result<Snapshot<T>, ReadError> {
    let snapshot: Snapshot<T> = match plan.strategy {
        ReadStrategy::ContainerCollective => {
            let backend = backend.ok_or_else(|| ReadError::UnsupportedFormat {
                detail: "container snapshot, but no container backend is available \
                         (build with the `hdf5` feature or supply a backend)"
                    .into(),
            })?;
            ContainerStrategy::new(backend).assemble(plan, cancel)?
        }
        ReadStrategy::LegacyCollective | ReadStrategy::LegacyPerProcess => {
            LegacyStrategy.assemble(plan, cancel)?
        }
    };
    info!(
        datadir = %plan.datadir.display(),
        shape = ?snapshot.f().shape(),
        t = %snapshot.t(),
        "assembled snapshot"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;
    use varcube_test_utils::SyntheticRun;

    use crate::config::SnapshotSelector;
    use crate::container::{MemoryBackend, MemoryContainer};

    fn opts(snapshot: SnapshotSelector) -> ReadOptions {
        ReadOptions {
            snapshot,
            worker_count: Some(2),
            ..ReadOptions::default()
        }
    }

    #[test]
    fn numbered_snapshot_before_start_is_signalled() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").started(false);
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let mut cache = MetadataCache::default();
        let err = plan_read(dir.path(), &opts(SnapshotSelector::Index(3)), &mut cache).unwrap_err();
        assert!(err.is_run_not_started());
        // The initial snapshot is still readable.
        assert!(plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut cache).is_ok());
    }

    #[test]
    fn missing_snapshot_file_fails_early() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").procs(2, 1, 1);
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let err = plan_read(
            dir.path(),
            &opts(SnapshotSelector::Index(9)),
            &mut MetadataCache::default(),
        )
        .unwrap_err();
        match err {
            ReadError::FileNotFound { path } => assert!(path.ends_with("proc0/VAR9")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plan_lists_processors_in_natural_order() {
        let run = SyntheticRun::new(12, 2, 2).scalar("lnrho").procs(12, 1, 1);
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let plan = plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut MetadataCache::default())
            .unwrap();
        let procs: Vec<usize> = plan.subdomains.iter().filter_map(|s| s.dir.proc).collect();
        assert_eq!(procs, (0..12).collect::<Vec<_>>());
        assert_eq!(plan.subdomains[11].dims.ipx, 11);
        assert!(plan.grid.is_none());
    }

    #[test]
    fn unsupported_io_strategy() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").io_strategy(Some("MPI-IO"));
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let err = plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut MetadataCache::default())
            .unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn container_run_needs_a_backend() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").io_strategy(Some("HDF5"));
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let plan = plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut MetadataCache::default())
            .unwrap();
        assert_eq!(plan.strategy, ReadStrategy::ContainerCollective);
        assert!(plan.subdomains[0].path.ends_with("allprocs/var.h5"));
        let err = assemble::<f64>(&plan, None, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn container_run_through_memory_backend() {
        let run = SyntheticRun::new(4, 2, 2)
            .scalar("lnrho")
            .scalar("ss")
            .io_strategy(Some("HDF5"));
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();

        let f = run.global_f();
        let mut c = MemoryContainer::new();
        c.insert_array("data/ss", &f.index_axis(Axis(0), 1).to_owned());
        c.insert_scalar("time", 4.0);
        for (axis, v) in ["x", "y", "z"].iter().zip(run.global_coords()) {
            let n = v.len();
            c.insert(format!("grid/{axis}"), v, vec![n]);
        }
        for axis in ["dx", "dy", "dz"] {
            c.insert_scalar(format!("grid/{axis}"), 0.5);
        }
        let backend = MemoryBackend::new().with_file(dir.path().join("allprocs").join("var.h5"), c);

        let plan = plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut MetadataCache::default())
            .unwrap();
        let snap = assemble::<f64>(&plan, Some(&backend), &CancelToken::new()).unwrap();
        assert_eq!(snap.field("ss").unwrap(), f.index_axis(Axis(0), 1));
        // Fields absent from the container stay zero.
        assert!(snap.field("lnrho").unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(snap.t(), 4.0);
    }

    #[test]
    fn single_processor_ignored_for_collective_runs() {
        let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").collective();
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let read = ReadOptions {
            proc: ProcSelector::Single(3),
            ..opts(SnapshotSelector::Latest)
        };
        let plan = plan_read(dir.path(), &read, &mut MetadataCache::default()).unwrap();
        assert_eq!(plan.strategy, ReadStrategy::LegacyCollective);
        let snap = assemble::<f64>(&plan, None, &CancelToken::new()).unwrap();
        assert_eq!(snap.f(), &run.global_f());
    }

    #[test]
    fn grid_is_attached_when_present() {
        let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").with_grid().procs(2, 1, 1);
        let dir = tempfile::tempdir().unwrap();
        run.write(dir.path()).unwrap();
        let plan = plan_read(dir.path(), &opts(SnapshotSelector::Latest), &mut MetadataCache::default())
            .unwrap();
        let snap = assemble::<f64>(&plan, None, &CancelToken::new()).unwrap();
        assert_eq!(snap.grid().unwrap().x, run.global_coords()[0]);
    }
}
