//! The consumer surface end to end: request, read, derive, trim.
//!
//! Runs are written with `SyntheticRun` into temporary directories;
//! container runs are served from a `MemoryBackend`.

use ndarray::Axis;
use varcube::assemble::{MemoryBackend, MemoryContainer, ReadError};
use varcube::prelude::*;
use varcube::VarError;
use varcube_test_utils::SyntheticRun;

// ── Helpers ─────────────────────────────────────────────────────

/// `aa = (0, 0.01 x, 0)` in index units, then a gentle `lnrho`.
fn gentle(slot: usize, gx: usize, gy: usize, gz: usize) -> f64 {
    match slot {
        1 => 0.01 * gx as f64,
        3 => 0.1 + 0.01 * (gx + gy + gz) as f64,
        _ => 0.0,
    }
}

fn mhd_run() -> SyntheticRun {
    SyntheticRun::new(4, 4, 2)
        .vector(["ax", "ay", "az"])
        .scalar("lnrho")
        .values(gentle)
}

fn container_for(run: &SyntheticRun) -> MemoryContainer {
    let mut c = MemoryContainer::new();
    let f = run.global_f();
    for (name, slot) in run.index().iter() {
        c.insert_array(format!("data/{name}"), &f.index_axis(Axis(0), slot - 1).to_owned());
    }
    c.insert_scalar("time", run.t);
    let [x, y, z] = run.global_coords();
    for (axis, v) in [("x", x), ("y", y), ("z", z)] {
        let n = v.len();
        c.insert(format!("grid/{axis}"), v, vec![n]);
    }
    for (axis, h) in ["dx", "dy", "dz"].iter().zip(run.spacing) {
        c.insert_scalar(format!("grid/{axis}"), h);
    }
    c
}

// ── Pipeline ────────────────────────────────────────────────────

#[test]
fn derive_then_trim() {
    let run = mhd_run().procs(2, 2, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let request = ReadRequest::new(dir.path())
        .derive([DerivedField::Bb, DerivedField::Rho])
        .trim(true)
        .workers(2);
    let snap: Snapshot<f64> = read_var(&request).unwrap();

    assert!(snap.is_trimmed());
    assert_eq!(snap.f().shape(), &[4, 2, 4, 4]);
    assert_eq!(snap.x().len(), 4);
    // d(ay)/dx = 0.01 / dx everywhere in the interior.
    let bb = &snap.derived()["bb"];
    assert_eq!(bb.shape(), &[3, 2, 4, 4]);
    assert!(bb.index_axis(Axis(0), 2).iter().all(|&b| (b - 0.1).abs() < 1e-12));
    let lnrho = snap.field("lnrho").unwrap();
    for (r, l) in snap.derived()["rho"].iter().zip(lnrho.iter()) {
        assert!((r - l.exp()).abs() < 1e-12);
    }
    assert!(snap.derive_failures().is_empty());
}

#[test]
fn tags_are_parsed_up_front() {
    let err = ReadRequest::new("unused").derive_tags(["bb", "divu"]).unwrap_err();
    assert!(matches!(err, VarError::UnknownField(_)));
    let ok = ReadRequest::new("unused").derive_tags(["vort", " pp"]).unwrap();
    assert_eq!(ok.derived, [DerivedField::Vort, DerivedField::Pp]);
}

// ── Derived-field failures ──────────────────────────────────────

#[test]
fn lenient_read_records_failures() {
    let run = mhd_run();
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let request = ReadRequest::new(dir.path()).derive([DerivedField::Pp, DerivedField::Bb]);
    let snap: Snapshot<f32> = read_var(&request).unwrap();
    assert!(snap.derived().contains_key("bb"));
    assert_eq!(
        snap.derive_failures()["pp"],
        DeriveError::MissingField {
            field: "pp",
            missing: "ss, lnTT, or tt",
        }
    );
}

#[test]
fn strict_read_fails_on_first_missing_prerequisite() {
    let run = mhd_run();
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let request = ReadRequest::new(dir.path())
        .derive([DerivedField::Bb, DerivedField::Vort, DerivedField::Pp])
        .strict_derived(true);
    match read_var::<f64>(&request).unwrap_err() {
        VarError::Derive { field, source } => {
            assert_eq!(field, DerivedField::Vort);
            assert_eq!(
                source,
                DeriveError::MissingField {
                    field: "vort",
                    missing: "uu",
                }
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Session and signals ─────────────────────────────────────────

#[test]
fn unstarted_run_is_a_signal() {
    let run = mhd_run().started(false);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let request = ReadRequest::new(dir.path()).snapshot(SnapshotSelector::Index(2));
    let err = read_var::<f64>(&request).unwrap_err();
    assert!(err.is_run_not_started());
}

#[test]
fn session_reads_container_runs() {
    let run = mhd_run().io_strategy(Some("HDF5")).time(4.0);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let path = dir.path().join("allprocs").join("VAR1.h5");
    let mut reader = VarReader::new().with_backend(MemoryBackend::new().with_file(&path, container_for(&run)));
    let request = ReadRequest::new(dir.path())
        .snapshot(SnapshotSelector::Index(1))
        .derive([DerivedField::Bb]);
    let snap: Snapshot<f64> = reader.read(&request).unwrap();
    assert_eq!(snap.f(), &run.global_f());
    assert_eq!(snap.t(), 4.0);

    let again: Snapshot<f64> = reader.read(&request).unwrap();
    assert_eq!(again.derived()["bb"], snap.derived()["bb"]);
    assert!(reader.cache().hits() > 0);
    assert!(reader.invalidate(dir.path()));
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn container_run_without_backend_is_unsupported() {
    let run = mhd_run().io_strategy(Some("HDF5"));
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let err = read_var::<f64>(&ReadRequest::new(dir.path())).unwrap_err();
    assert!(matches!(err, VarError::Read(ReadError::UnsupportedFormat { .. })));
}

#[test]
fn cancelled_session_stops_reading() {
    let run = mhd_run().procs(2, 1, 1);
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();

    let cancel = CancelToken::new();
    let mut reader = VarReader::new().with_cancel(cancel.clone());
    cancel.cancel();
    let err = reader.read::<f64>(&ReadRequest::new(dir.path())).unwrap_err();
    assert!(matches!(err, VarError::Read(ReadError::Cancelled)));
    assert!(reader.cancel_token().is_cancelled());
}
