//! End-to-end assembly of synthetic runs written to disk.
//!
//! Every test writes a run with `SyntheticRun`, plans the read through a
//! fresh or shared `MetadataCache`, and checks the assembled snapshot
//! against the fixture's global reference tensor.

use varcube_assemble::{
    assemble, plan_read, CancelToken, MetadataCache, ProcSelector, ReadError, ReadOptions,
    ReadStrategy, Snapshot, SnapshotSelector,
};
use varcube_core::{Layout, Precision};
use varcube_test_utils::SyntheticRun;

// ── Helpers ─────────────────────────────────────────────────────

fn read<T: varcube_core::Real>(
    dir: &std::path::Path,
    opts: &ReadOptions,
) -> Result<Snapshot<T>, ReadError> {
    let mut cache = MetadataCache::default();
    let plan = plan_read(dir, opts, &mut cache)?;
    assemble(&plan, None, &CancelToken::new())
}

fn workers(n: usize) -> ReadOptions {
    ReadOptions {
        worker_count: Some(n),
        ..ReadOptions::default()
    }
}

// ── Stitching ───────────────────────────────────────────────────

#[test]
fn split_along_every_axis_matches_global() {
    let run = SyntheticRun::new(6, 4, 4)
        .vector(["ax", "ay", "az"])
        .scalar("lnrho")
        .procs(3, 2, 2);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let snap = read::<f64>(dir.path(), &workers(4)).unwrap();
    assert_eq!(snap.f(), &run.global_f());
    assert_eq!(snap.field("aa").unwrap().shape(), &[3, 10, 10, 12]);
    assert_eq!(snap.bounds().x, 3..9);
}

#[test]
fn per_process_and_collective_runs_agree() {
    let base = SyntheticRun::new(4, 4, 2).scalar("lnrho").scalar("ss").time(0.75);
    let split = tempfile::tempdir().unwrap();
    base.clone().procs(2, 2, 1).write(split.path()).unwrap();
    let whole = tempfile::tempdir().unwrap();
    base.clone().collective().write(whole.path()).unwrap();

    let a = read::<f64>(split.path(), &workers(2)).unwrap();
    let b = read::<f64>(whole.path(), &workers(2)).unwrap();
    assert_eq!(a.f(), b.f());
    assert_eq!(a.x(), b.x());
    assert_eq!(a.t(), b.t());
}

#[test]
fn many_processors_follow_natural_order() {
    // Eleven processors along x: lexical order would place proc10 second.
    let run = SyntheticRun::new(11, 1, 1).nghost(1).scalar("lnrho").procs(11, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let snap = read::<f64>(dir.path(), &workers(3)).unwrap();
    assert_eq!(snap.f(), &run.global_f());
}

#[test]
fn single_processor_read_skips_placement() {
    let run = SyntheticRun::new(4, 4, 2).scalar("lnrho").procs(2, 2, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let opts = ReadOptions {
        proc: ProcSelector::Single(3),
        ..workers(2)
    };
    let snap = read::<f64>(dir.path(), &opts).unwrap();
    let d = run.proc_dims(1, 1, 0);
    assert_eq!(snap.f().shape(), &[1, d.mz, d.my, d.mx]);
    assert_eq!(snap.f()[[0, 3, 3, 3]], run.global_f()[[0, 3, 5, 5]]);
}

#[test]
fn reduced_single_precision_run() {
    let run = SyntheticRun::new(4, 4, 1)
        .scalar("lnrho")
        .write_2d()
        .precision(Precision::Single)
        .procs(2, 2, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let snap = read::<f32>(dir.path(), &workers(2)).unwrap();
    assert_eq!(snap.layout(), Layout::ReducedXy);
    assert_eq!(snap.f(), &run.global_f().mapv(|v| v as f32));
}

#[test]
fn auxiliary_slots_only_when_written() {
    let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").aux_scalar("bb_aux");
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();
    let snap = read::<f64>(dir.path(), &workers(1)).unwrap();
    assert_eq!(snap.f().shape()[0], 1);
    assert!(snap.field("bb_aux").is_none());

    let with_aux = tempfile::tempdir().unwrap();
    run.clone().write_aux(true).write(with_aux.path()).unwrap();
    let snap = read::<f64>(with_aux.path(), &workers(1)).unwrap();
    assert_eq!(snap.f().shape()[0], 2);
    assert!(snap.field("bb_aux").is_some());
}

// ── Errors and control ──────────────────────────────────────────

#[test]
fn malformed_subdomain_aborts_the_read() {
    let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").procs(2, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();
    let path = dir.path().join("proc1").join("var.dat");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = read::<f64>(dir.path(), &workers(2)).unwrap_err();
    assert!(matches!(err, ReadError::Record { .. }));
}

#[test]
fn cancelled_read_returns_no_snapshot() {
    let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").procs(4, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let mut cache = MetadataCache::default();
    let plan = plan_read(dir.path(), &workers(2), &mut cache).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = assemble::<f64>(&plan, None, &cancel).unwrap_err();
    assert!(matches!(err, ReadError::Cancelled));
}

#[test]
fn downsampled_snapshot_uses_its_own_dims() {
    let full = SyntheticRun::new(8, 8, 8).scalar("lnrho");
    let dir = tempfile::tempdir().unwrap();
    full.write(dir.path()).unwrap();

    // A downsampled run alongside: its own dim file and snapshot.
    let down = SyntheticRun::new(2, 2, 2).scalar("lnrho").file_name("VARd1");
    let scratch = tempfile::tempdir().unwrap();
    down.write(scratch.path()).unwrap();
    std::fs::copy(scratch.path().join("dim.dat"), dir.path().join("dim_down.dat")).unwrap();
    std::fs::copy(
        scratch.path().join("proc0").join("dim.dat"),
        dir.path().join("proc0").join("dim_down.dat"),
    )
    .unwrap();
    std::fs::copy(
        scratch.path().join("proc0").join("VARd1"),
        dir.path().join("proc0").join("VARd1"),
    )
    .unwrap();

    let opts = ReadOptions {
        snapshot: SnapshotSelector::File("VARd1".into()),
        ..workers(1)
    };
    let snap = read::<f64>(dir.path(), &opts).unwrap();
    assert_eq!(snap.f(), &down.global_f());
}

#[test]
fn cache_is_reused_across_reads() {
    let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").procs(2, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let mut cache = MetadataCache::default();
    let first = plan_read(dir.path(), &workers(1), &mut cache).unwrap();
    let misses = cache.misses();
    let second = plan_read(dir.path(), &workers(1), &mut cache).unwrap();
    assert_eq!(cache.misses(), misses);
    assert!(std::sync::Arc::ptr_eq(&first.metadata, &second.metadata));
    assert_eq!(second.strategy, ReadStrategy::LegacyPerProcess);
}
