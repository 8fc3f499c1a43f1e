//! Error types for record decoding.

use std::fmt;
use std::io;

/// Errors that can occur while decoding legacy snapshot records.
#[derive(Debug)]
pub enum RecordError {
    /// An I/O error occurred during the read.
    Io(io::Error),
    /// The stream ended inside a record, or before a required record.
    UnexpectedEof {
        /// What was being read when the stream ended.
        detail: String,
    },
    /// A record's framing or element count does not match any expected
    /// encoding.
    MalformedRecord {
        /// Human-readable description of what went wrong.
        detail: String,
        /// The offending element (or byte) count.
        count: usize,
    },
}

impl RecordError {
    pub(crate) fn malformed(detail: impl Into<String>, count: usize) -> Self {
        Self::MalformedRecord {
            detail: detail.into(),
            count,
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::UnexpectedEof { detail } => write!(f, "unexpected end of file: {detail}"),
            Self::MalformedRecord { detail, count } => {
                write!(f, "malformed record ({count}): {detail}")
            }
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RecordError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof {
                detail: e.to_string(),
            }
        } else {
            Self::Io(e)
        }
    }
}
