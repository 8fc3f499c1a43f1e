//! Errors from assembling a snapshot.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use varcube_core::MetadataError;
use varcube_record::RecordError;

use crate::container::ContainerError;

/// Errors that abort a snapshot read.
///
/// No partial snapshot is returned when any of these occur.
#[derive(Debug)]
pub enum ReadError {
    /// A non-initial snapshot was requested before the run produced any
    /// output. Callers usually treat this as a signal, not a failure.
    RunNotStarted {
        /// The snapshot that was asked for.
        requested: String,
    },
    /// The snapshot file does not exist.
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// The run's I/O strategy is not one this reader understands, or the
    /// container backend it needs is not available.
    UnsupportedFormat {
        /// What was found.
        detail: String,
    },
    /// A snapshot file could not be decoded.
    Record {
        /// File being decoded.
        path: PathBuf,
        /// Decode failure.
        source: RecordError,
    },
    /// A container file could not be opened or read.
    Container {
        /// File being read.
        path: PathBuf,
        /// Backend failure.
        source: ContainerError,
    },
    /// Run metadata could not be resolved.
    Metadata(MetadataError),
    /// A filesystem operation failed outside record decoding.
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Subdomain geometry does not fit the global array.
    Layout {
        /// Description of the mismatch.
        detail: String,
    },
    /// The read was cancelled through its [`CancelToken`](crate::CancelToken).
    Cancelled,
    /// A decode worker exited without reporting a result.
    WorkerFailed {
        /// What went wrong.
        detail: String,
    },
}

impl ReadError {
    /// Whether this is the "run has not started" signal.
    pub fn is_run_not_started(&self) -> bool {
        matches!(self, Self::RunNotStarted { .. })
    }

    pub(crate) fn record(path: impl Into<PathBuf>, source: RecordError) -> Self {
        match source {
            RecordError::Io(e) if e.kind() == io::ErrorKind::NotFound => Self::FileNotFound {
                path: path.into(),
            },
            source => Self::Record {
                path: path.into(),
                source,
            },
        }
    }

    pub(crate) fn layout(detail: impl Into<String>) -> Self {
        Self::Layout {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunNotStarted { requested } => {
                write!(f, "run has not started: no output for snapshot {requested}")
            }
            Self::FileNotFound { path } => write!(f, "snapshot not found: {}", path.display()),
            Self::UnsupportedFormat { detail } => write!(f, "unsupported snapshot format: {detail}"),
            Self::Record { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Container { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Metadata(e) => write!(f, "metadata: {e}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Layout { detail } => write!(f, "subdomain layout: {detail}"),
            Self::Cancelled => write!(f, "read cancelled"),
            Self::WorkerFailed { detail } => write!(f, "decode worker failed: {detail}"),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Record { source, .. } => Some(source),
            Self::Container { source, .. } => Some(source),
            Self::Metadata(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<MetadataError> for ReadError {
    fn from(e: MetadataError) -> Self {
        Self::Metadata(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_file_not_found() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = ReadError::record("proc0/VAR3", RecordError::Io(io));
        assert!(matches!(err, ReadError::FileNotFound { .. }));
    }

    #[test]
    fn malformed_record_keeps_its_count() {
        let src = RecordError::MalformedRecord {
            detail: "bad".into(),
            count: 17,
        };
        let err = ReadError::record("proc0/var.dat", src);
        assert!(err.to_string().contains("(17)"));
        assert!(err.source().is_some());
    }

    #[test]
    fn run_not_started_is_a_signal() {
        let err = ReadError::RunNotStarted {
            requested: "VAR2".into(),
        };
        assert!(err.is_run_not_started());
        assert!(!ReadError::Cancelled.is_run_not_started());
    }
}
