//! Computing requested derived fields on a snapshot.

use std::fmt;

use ndarray::ArrayD;
use smallvec::SmallVec;
use tracing::{debug, warn};
use varcube_assemble::Snapshot;
use varcube_core::{DeriveError, Real};

use crate::curl::{CurlOperator, Geometry};
use crate::field::{DerivationKind, DerivedField};
use crate::thermo;

/// What happened to one requested field.
#[derive(Clone, Debug, PartialEq)]
pub enum DerivationOutcome {
    /// Computed and stored under the listed names.
    Computed(SmallVec<[String; 1]>),
    /// Already present on the snapshot; left untouched.
    AlreadyPresent,
    /// Could not be computed.
    Failed(DeriveError),
}

/// Per-field outcomes of one [`derive_fields`] call, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivationReport {
    outcomes: Vec<(DerivedField, DerivationOutcome)>,
}

impl DerivationReport {
    /// Every outcome in request order. Repeated requests appear once.
    pub fn outcomes(&self) -> &[(DerivedField, DerivationOutcome)] {
        &self.outcomes
    }

    /// Outcome for `field`, if it was requested.
    pub fn outcome(&self, field: DerivedField) -> Option<&DerivationOutcome> {
        self.outcomes.iter().find(|(f, _)| *f == field).map(|(_, o)| o)
    }

    /// Failed fields with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (DerivedField, &DeriveError)> {
        self.outcomes.iter().filter_map(|(f, o)| match o {
            DerivationOutcome::Failed(e) => Some((*f, e)),
            _ => None,
        })
    }

    /// The first failure in request order.
    pub fn first_failure(&self) -> Option<(DerivedField, &DeriveError)> {
        self.failures().next()
    }

    /// Whether no requested field failed.
    pub fn is_clean(&self) -> bool {
        self.first_failure().is_none()
    }
}

impl fmt::Display for DerivationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(
            f,
            "{} derived field(s) requested, {failed} failed",
            self.outcomes.len()
        )
    }
}

type Computed<T> = SmallVec<[(String, ArrayD<T>); 1]>;

/// Compute `fields` on `snap`, storing results as derived arrays.
///
/// Fields already present (primitive or derived) are left untouched.
/// A failing field is recorded on the snapshot and never stops the
/// remaining ones. Vector-calculus fields need ghost cells and fail on
/// a trimmed snapshot.
pub fn derive_fields<T: Real>(
    snap: &mut Snapshot<T>,
    fields: &[DerivedField],
    curl: &dyn CurlOperator<T>,
) -> DerivationReport {
    let mut report = DerivationReport::default();
    let mut geometry: Option<Geometry> = None;

    for &field in fields {
        if report.outcome(field).is_some() {
            continue;
        }
        if field != DerivedField::BbTest && snap.has(field.tag()) {
            report.outcomes.push((field, DerivationOutcome::AlreadyPresent));
            continue;
        }

        let computed = if field.kind() == DerivationKind::VectorCalculus && snap.is_trimmed() {
            Err(DeriveError::ShapeMismatch {
                detail: format!("'{field}' needs ghost cells; derive before trimming"),
            })
        } else {
            compute(snap, field, curl, &mut geometry)
        };

        let outcome = computed.and_then(|arrays| {
            let mut names = SmallVec::new();
            for (name, array) in arrays {
                snap.insert_derived(name.clone(), array)?;
                names.push(name);
            }
            Ok(names)
        });
        match outcome {
            Ok(names) if names.is_empty() => {
                report.outcomes.push((field, DerivationOutcome::AlreadyPresent));
            }
            Ok(names) => {
                debug!(field = %field, stored = ?names.as_slice(), "derived field computed");
                report.outcomes.push((field, DerivationOutcome::Computed(names)));
            }
            Err(err) => {
                warn!(field = %field, error = %err, "derived field not computed");
                snap.record_failure(field.tag(), err.clone());
                report.outcomes.push((field, DerivationOutcome::Failed(err)));
            }
        }
    }
    report
}

fn retag(err: DeriveError, field: DerivedField) -> DeriveError {
    match err {
        DeriveError::UnsupportedCoordinates { system, .. } => DeriveError::UnsupportedCoordinates {
            field: field.tag(),
            system,
        },
        other => other,
    }
}

fn single<T>(field: DerivedField, array: ArrayD<T>) -> Computed<T> {
    let mut out = Computed::new();
    out.push((field.tag().to_string(), array));
    out
}

fn compute<T: Real>(
    snap: &Snapshot<T>,
    field: DerivedField,
    curl: &dyn CurlOperator<T>,
    geometry: &mut Option<Geometry>,
) -> Result<Computed<T>, DeriveError> {
    let missing = |name| DeriveError::MissingField {
        field: field.tag(),
        missing: name,
    };
    let eos = snap.metadata().params.eos;
    match field {
        DerivedField::Bb | DerivedField::Jj | DerivedField::Vort => {
            let source = if field == DerivedField::Vort { "uu" } else { "aa" };
            let v = snap.field(source).ok_or_else(|| missing(source))?;
            let geo = geometry.get_or_insert_with(|| Geometry::of(snap));
            let array = if field == DerivedField::Jj {
                curl.curl_curl(v, geo)
            } else {
                curl.curl(v, geo)
            };
            Ok(single(field, array.map_err(|e| retag(e, field))?))
        }
        DerivedField::BbTest => {
            let groups = snap.metadata().index.test_groups("aatest");
            if groups.is_empty() {
                return Err(missing("aatest"));
            }
            let geo = geometry.get_or_insert_with(|| Geometry::of(snap));
            let mut out = Computed::new();
            for group in groups {
                let name = group.name.replacen("aatest", "bbtest", 1);
                if snap.has(&name) {
                    continue;
                }
                let a = snap.field(&group.name).ok_or_else(|| missing("aatest"))?;
                out.push((name, curl.curl(a, geo).map_err(|e| retag(e, field))?));
            }
            Ok(out)
        }
        DerivedField::Rho => thermo::density(snap).map(|a| single(field, a)),
        DerivedField::Tt => thermo::temperature(snap, &eos).map(|a| single(field, a)),
        DerivedField::Ss => thermo::entropy(snap, &eos).map(|a| single(field, a)),
        DerivedField::Pp => thermo::pressure(snap, &eos).map(|a| single(field, a)),
    }
}
