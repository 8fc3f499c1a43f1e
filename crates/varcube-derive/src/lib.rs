//! Derived fields for assembled snapshots.
//!
//! Vector-calculus fields go through a [`CurlOperator`]; the bundled
//! [`CentralCurl`] is a sixth-order central-difference scheme on
//! Cartesian grids. Thermodynamic fields are pointwise substitutions
//! using the run's equation-of-state constants.
//!
//! # Fields
//!
//! | Tag      | Definition                  | Needs                          |
//! |----------|-----------------------------|--------------------------------|
//! | `bb`     | `curl(aa)`                  | `aa`                           |
//! | `jj`     | `curl(curl(aa))`            | `aa`                           |
//! | `vort`   | `curl(uu)`                  | `uu`                           |
//! | `bbtest` | `curl(aatest<k>)` per group | `aatest` groups                |
//! | `rho`    | `exp(lnrho)`                | `lnrho`                        |
//! | `tt`     | temperature                 | `lnTT`, or `ss` and density    |
//! | `ss`     | specific entropy            | `lnTT` or `tt`, and density    |
//! | `pp`     | pressure                    | density, and `ss`/`lnTT`/`tt`  |
//!
//! Derivation must happen before ghost cells are trimmed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod curl;
pub mod derive;
pub mod field;
pub mod thermo;

pub use curl::{CentralCurl, CurlOperator, Geometry, STENCIL_RADIUS};
pub use derive::{derive_fields, DerivationOutcome, DerivationReport};
pub use field::{parse_fields, DerivationKind, DerivedField, UnknownFieldTag};
