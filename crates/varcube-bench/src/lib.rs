//! Benchmark profiles for the varcube snapshot reader.
//!
//! Provides pre-built [`SyntheticRun`] profiles:
//!
//! - [`reference_profile`]: 32×32×32 interior, 8 variables, 2×2×2 processors
//! - [`stress_profile`]: 64×64×32 interior, 8 variables, 4×4×2 processors
//! - [`smooth_values`]: a value function whose derivatives stay bounded

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use varcube_core::Precision;
use varcube_test_utils::SyntheticRun;

/// Values that are smooth in every direction, so curls and
/// thermodynamic exponentials stay finite on large grids.
pub fn smooth_values(slot: usize, gx: usize, gy: usize, gz: usize) -> f64 {
    let (x, y, z) = (gx as f64 * 0.05, gy as f64 * 0.07, gz as f64 * 0.11);
    0.1 * (slot as f64 + 1.0) * (x.sin() + y.cos() * z.sin())
}

fn mhd(nx: usize, ny: usize, nz: usize) -> SyntheticRun {
    SyntheticRun::new(nx, ny, nz)
        .vector(["ux", "uy", "uz"])
        .vector(["ax", "ay", "az"])
        .scalar("lnrho")
        .scalar("ss")
        .values(smooth_values)
}

/// Reference profile: 32×32×32 interior split over 2×2×2 processors.
pub fn reference_profile(precision: Precision) -> SyntheticRun {
    mhd(32, 32, 32).procs(2, 2, 2).precision(precision)
}

/// Stress profile: 64×64×32 interior split over 4×4×2 processors.
pub fn stress_profile(precision: Precision) -> SyntheticRun {
    mhd(64, 64, 32).procs(4, 4, 2).precision(precision)
}
