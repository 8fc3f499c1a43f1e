//! The facade's error type.

use std::error::Error;
use std::fmt;

use varcube_assemble::{ReadError, TrimError};
use varcube_core::DeriveError;
use varcube_derive::{DerivedField, UnknownFieldTag};

/// Errors from [`read_var`](crate::read_var) and
/// [`VarReader::read`](crate::VarReader::read).
#[derive(Debug)]
pub enum VarError {
    /// The snapshot could not be assembled.
    Read(ReadError),
    /// A derived field failed under `strict_derived`.
    Derive {
        /// The field that failed first.
        field: DerivedField,
        /// Why it failed.
        source: DeriveError,
    },
    /// A requested derived-field tag is not known.
    UnknownField(UnknownFieldTag),
    /// Ghost cells could not be trimmed.
    Trim(TrimError),
}

impl VarError {
    /// Whether this is the "run has not started" signal.
    pub fn is_run_not_started(&self) -> bool {
        matches!(self, Self::Read(e) if e.is_run_not_started())
    }
}

impl fmt::Display for VarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(e) => write!(f, "{e}"),
            Self::Derive { field, source } => write!(f, "derived field '{field}': {source}"),
            Self::UnknownField(e) => write!(f, "{e}"),
            Self::Trim(e) => write!(f, "trim: {e}"),
        }
    }
}

impl Error for VarError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            Self::Derive { source, .. } => Some(source),
            Self::UnknownField(e) => Some(e),
            Self::Trim(e) => Some(e),
        }
    }
}

impl From<ReadError> for VarError {
    fn from(e: ReadError) -> Self {
        Self::Read(e)
    }
}

impl From<TrimError> for VarError {
    fn from(e: TrimError) -> Self {
        Self::Trim(e)
    }
}

impl From<UnknownFieldTag> for VarError {
    fn from(e: UnknownFieldTag) -> Self {
        Self::UnknownField(e)
    }
}
