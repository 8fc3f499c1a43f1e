//! Thermodynamic substitutions between density, temperature, entropy,
//! and pressure.
//!
//! Every field function reads its inputs through
//! [`Snapshot::lookup`], so fields derived earlier in the same pass are
//! usable as inputs. Density enters as `lnrho` when present, otherwise
//! as `ln(rho)`.

use ndarray::{ArrayD, ArrayViewD, Zip};
use varcube_assemble::Snapshot;
use varcube_core::{DeriveError, EosConstants, Real};

fn c<T: Real>(v: f64) -> T {
    T::from_f64_lossy(v)
}

// ── Pointwise relations ────────────────────────────────────────────

/// `ln T` from specific entropy and log density.
pub fn temperature_from_entropy<T: Real>(eos: &EosConstants, ss: T, lnrho: T) -> T {
    let g = eos.gamma;
    let ln_tt = c::<T>(eos.lnTT0()) + c::<T>(g / eos.cp) * ss + c::<T>(g - 1.0) * (lnrho - c(eos.lnrho0()));
    ln_tt.exp()
}

/// Specific entropy from `ln T` and log density.
pub fn entropy_from_log_temperature<T: Real>(eos: &EosConstants, ln_tt: T, lnrho: T) -> T {
    let g = eos.gamma;
    c::<T>(eos.cp / g) * (ln_tt - c(eos.lnTT0()) - c::<T>(g - 1.0) * (lnrho - c(eos.lnrho0())))
}

/// Pressure from specific entropy and log density.
pub fn pressure_from_entropy<T: Real>(eos: &EosConstants, ss: T, lnrho: T) -> T {
    let g = eos.gamma;
    let p0 = eos.rho0 * eos.cs0 * eos.cs0 / g;
    c::<T>(p0) * (c::<T>(g) * (ss + lnrho - c(eos.lnrho0()))).exp()
}

/// Pressure from `ln T` and log density.
pub fn pressure_from_log_temperature<T: Real>(eos: &EosConstants, ln_tt: T, lnrho: T) -> T {
    c::<T>(eos.cp - eos.cv()) * (ln_tt + lnrho).exp()
}

// ── Snapshot fields ────────────────────────────────────────────────

fn owned<T: Real>(v: Option<ArrayViewD<'_, T>>) -> Option<ArrayD<T>> {
    v.map(|a| a.to_owned())
}

/// Log density: `lnrho`, or `ln(rho)`.
fn log_density<T: Real>(snap: &Snapshot<T>) -> Option<ArrayD<T>> {
    owned(snap.lookup("lnrho")).or_else(|| snap.lookup("rho").map(|r| r.mapv(T::ln)))
}

/// Log temperature: `lnTT`, or `ln(tt)`.
fn log_temperature<T: Real>(snap: &Snapshot<T>) -> Option<ArrayD<T>> {
    owned(snap.lookup("lnTT")).or_else(|| snap.lookup("tt").map(|t| t.mapv(T::ln)))
}

fn combine<T: Real>(a: &ArrayD<T>, b: &ArrayD<T>, f: impl Fn(T, T) -> T) -> Result<ArrayD<T>, DeriveError> {
    if a.shape() != b.shape() {
        return Err(DeriveError::ShapeMismatch {
            detail: format!("inputs have shapes {:?} and {:?}", a.shape(), b.shape()),
        });
    }
    Ok(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)))
}

/// Density, `exp(lnrho)`.
pub fn density<T: Real>(snap: &Snapshot<T>) -> Result<ArrayD<T>, DeriveError> {
    snap.lookup("lnrho")
        .map(|lnrho| lnrho.mapv(T::exp))
        .ok_or(DeriveError::MissingField {
            field: "rho",
            missing: "lnrho",
        })
}

/// Temperature, from `lnTT` or from entropy and density.
pub fn temperature<T: Real>(snap: &Snapshot<T>, eos: &EosConstants) -> Result<ArrayD<T>, DeriveError> {
    if let Some(ln_tt) = snap.lookup("lnTT") {
        return Ok(ln_tt.mapv(T::exp));
    }
    let Some(ss) = owned(snap.lookup("ss")) else {
        return Err(DeriveError::MissingField {
            field: "tt",
            missing: "ss",
        });
    };
    let lnrho = log_density(snap).ok_or(DeriveError::MissingField {
        field: "tt",
        missing: "lnrho or rho",
    })?;
    combine(&ss, &lnrho, |s, r| temperature_from_entropy(eos, s, r))
}

/// Specific entropy, from `lnTT` (or `ln tt`) and density.
pub fn entropy<T: Real>(snap: &Snapshot<T>, eos: &EosConstants) -> Result<ArrayD<T>, DeriveError> {
    let ln_tt = log_temperature(snap).ok_or(DeriveError::MissingField {
        field: "ss",
        missing: "lnTT or tt",
    })?;
    let lnrho = log_density(snap).ok_or(DeriveError::MissingField {
        field: "ss",
        missing: "lnrho or rho",
    })?;
    combine(&ln_tt, &lnrho, |t, r| entropy_from_log_temperature(eos, t, r))
}

/// Pressure, from density and one of entropy, `lnTT`, or `tt`.
pub fn pressure<T: Real>(snap: &Snapshot<T>, eos: &EosConstants) -> Result<ArrayD<T>, DeriveError> {
    let lnrho = log_density(snap).ok_or(DeriveError::MissingField {
        field: "pp",
        missing: "lnrho or rho",
    })?;
    if let Some(ss) = owned(snap.lookup("ss")) {
        return combine(&ss, &lnrho, |s, r| pressure_from_entropy(eos, s, r));
    }
    match log_temperature(snap) {
        Some(ln_tt) => combine(&ln_tt, &lnrho, |t, r| pressure_from_log_temperature(eos, t, r)),
        None => Err(DeriveError::MissingField {
            field: "pp",
            missing: "ss, lnTT, or tt",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eos() -> EosConstants {
        EosConstants {
            cp: 2.5,
            gamma: 1.4,
            cs0: 0.8,
            rho0: 1.7,
        }
    }

    #[test]
    fn pressure_paths_agree_with_unit_cp() {
        let eos = EosConstants::default();
        let (ss, lnrho) = (0.3f64, -0.4f64);
        let ln_tt = temperature_from_entropy(&eos, ss, lnrho).ln();
        let from_ss = pressure_from_entropy(&eos, ss, lnrho);
        let from_tt = pressure_from_log_temperature(&eos, ln_tt, lnrho);
        assert!((from_ss - from_tt).abs() < 1e-12 * from_ss);
    }

    #[test]
    fn reference_state_has_zero_entropy() {
        let eos = eos();
        let s = entropy_from_log_temperature(&eos, eos.lnTT0(), eos.lnrho0());
        assert!(s.abs() < 1e-14);
    }

    proptest! {
        #[test]
        fn entropy_and_temperature_invert(ss in -2.0f64..2.0, lnrho in -3.0f64..3.0) {
            let eos = eos();
            let tt = temperature_from_entropy(&eos, ss, lnrho);
            let back = entropy_from_log_temperature(&eos, tt.ln(), lnrho);
            prop_assert!((back - ss).abs() < 1e-10);
        }
    }
}
