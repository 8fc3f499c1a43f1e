//! Test utilities for varcube development.
//!
//! Provides a [`RecordWriter`] that produces length-framed records and a
//! [`SyntheticRun`] builder that lays out a complete run directory
//! (dimension, index, and parameter files plus per-processor snapshots)
//! whose values are a known function of global position.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{FixturePersist, SyntheticRun};

use std::io::{self, Write};

use varcube_core::Precision;

/// Writes `[u32 len][payload][u32 len]` records, little-endian.
pub struct RecordWriter<W: Write> {
    writer: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Frame and write a raw payload.
    pub fn write_record(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.write_all(&len.to_le_bytes())
    }

    /// Write one record of reals encoded in `precision`.
    pub fn write_reals(&mut self, values: &[f64], precision: Precision) -> io::Result<()> {
        let mut buf = Vec::with_capacity(values.len() * precision.bytes());
        for &v in values {
            match precision {
                Precision::Single => buf.extend_from_slice(&(v as f32).to_le_bytes()),
                Precision::Double => buf.extend_from_slice(&v.to_le_bytes()),
            }
        }
        self.write_record(&buf)
    }

    /// Write one record of `i32`s.
    pub fn write_ints(&mut self, values: &[i32]) -> io::Result<()> {
        let buf: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_record(&buf)
    }

    /// Write a 4-byte id record.
    pub fn write_id(&mut self, id: i32) -> io::Result<()> {
        self.write_record(&id.to_le_bytes())
    }
}
