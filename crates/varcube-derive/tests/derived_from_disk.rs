//! Derived fields on snapshots assembled from runs on disk.
//!
//! Covers the path a consumer takes: plan and assemble a partitioned
//! run, derive fields on the untrimmed snapshot, then trim.

use varcube_assemble::{assemble, plan_read, CancelToken, MetadataCache, ReadOptions, Snapshot};
use varcube_derive::{derive_fields, CentralCurl, DerivationOutcome, DerivedField, Geometry};
use varcube_test_utils::SyntheticRun;

// ── Helpers ─────────────────────────────────────────────────────

/// Cell-centred coordinate for global index `i` with spacing `h`.
fn at(i: usize, h: f64) -> f64 {
    (i as f64 - 2.5) * h
}

/// `uu = (-y, x, 0)` scaled, `aa = (0, x², y z)`, then `lnrho`.
fn flow(slot: usize, gx: usize, gy: usize, gz: usize) -> f64 {
    let (x, y, z) = (at(gx, 0.1), at(gy, 0.2), at(gz, 0.3));
    match slot {
        0 => -y,
        1 => x,
        4 => x * x,
        5 => y * z,
        6 => 0.1 * x - 0.2 * z,
        _ => 0.0,
    }
}

fn mhd_run() -> SyntheticRun {
    SyntheticRun::new(6, 4, 4)
        .vector(["ux", "uy", "uz"])
        .vector(["ax", "ay", "az"])
        .scalar("lnrho")
        .values(flow)
        .with_grid()
}

fn read(run: &SyntheticRun) -> Snapshot<f64> {
    let dir = tempfile::tempdir().unwrap();
    run.write(dir.path()).unwrap();
    let mut cache = MetadataCache::default();
    let opts = ReadOptions {
        worker_count: Some(2),
        ..ReadOptions::default()
    };
    let plan = plan_read(dir.path(), &opts, &mut cache).unwrap();
    assemble(&plan, None, &CancelToken::new()).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────

#[test]
fn partitioned_and_whole_runs_derive_identically() {
    let fields = [DerivedField::Bb, DerivedField::Jj, DerivedField::Vort, DerivedField::Rho];
    let mut split = read(&mhd_run().procs(2, 2, 2));
    let mut whole = read(&mhd_run());

    let a = derive_fields(&mut split, &fields, &CentralCurl);
    let b = derive_fields(&mut whole, &fields, &CentralCurl);
    assert!(a.is_clean(), "{a}");
    assert_eq!(a.outcomes(), b.outcomes());
    for name in ["bb", "jj", "vort", "rho"] {
        assert_eq!(split.derived()[name], whole.derived()[name], "{name}");
    }
}

#[test]
fn grid_record_supplies_inverse_spacing() {
    let snap = read(&mhd_run());
    assert!(snap.grid().is_some());
    let geo = Geometry::of(&snap);
    assert!(geo.inv_spacing[2].iter().all(|&v| (v - 1.0 / 0.3).abs() < 1e-12));
    assert_eq!(geo.ghost, [3, 3, 3]);
}

#[test]
fn vorticity_and_field_values_survive_trimming() {
    let mut snap = read(&mhd_run().procs(3, 1, 2));
    let report = derive_fields(&mut snap, &[DerivedField::Vort, DerivedField::Bb], &CentralCurl);
    assert!(matches!(
        report.outcome(DerivedField::Bb),
        Some(DerivationOutcome::Computed(_))
    ));
    snap.trim().unwrap();

    let vort = &snap.derived()["vort"];
    assert_eq!(vort.shape(), &[3, 4, 4, 6]);
    assert!(vort.iter().skip(2 * 96).all(|&w| (w - 2.0).abs() < 1e-9));

    // aa = (0, x², y z)  →  bb = (z, 0, 2x)
    let bb = &snap.derived()["bb"];
    let z = snap.z().to_vec();
    let x = snap.x().to_vec();
    for k in 0..4 {
        for i in 0..6 {
            assert!((bb[[0, k, 1, i]] - z[k]).abs() < 1e-9);
            assert!((bb[[2, k, 1, i]] - 2.0 * x[i]).abs() < 1e-9);
        }
    }
}
