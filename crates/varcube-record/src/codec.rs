//! Record framing and primitive decoding.
//!
//! Every record is framed by a little-endian `u32` byte count before and
//! after the payload. The two markers must agree. All numeric payloads
//! are little-endian.

use std::io::{ErrorKind, Read};

use varcube_core::{Precision, Real};

use crate::error::RecordError;
use crate::MARKER_BYTES;

// ── Primitive decoders ──────────────────────────────────────────

/// Decode a payload of reals stored in `precision`, widened to `f64`.
pub fn decode_reals(bytes: &[u8], precision: Precision) -> Result<Vec<f64>, RecordError> {
    decode_reals_as(bytes, precision)
}

/// Decode a payload of reals stored in `precision`, cast to `T`.
pub fn decode_reals_as<T: Real>(bytes: &[u8], precision: Precision) -> Result<Vec<T>, RecordError> {
    let width = precision.bytes();
    if bytes.len() % width != 0 {
        return Err(RecordError::malformed(
            format!("payload is not a whole number of {width}-byte reals"),
            bytes.len(),
        ));
    }
    let values = match precision {
        Precision::Single => bytes
            .chunks_exact(4)
            .map(|c| {
                let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                T::from_f64_lossy(f64::from(v))
            })
            .collect(),
        Precision::Double => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                T::from_f64_lossy(f64::from_le_bytes(buf))
            })
            .collect(),
    };
    Ok(values)
}

/// Decode a payload of little-endian `i32`s.
pub fn decode_ints(bytes: &[u8]) -> Result<Vec<i32>, RecordError> {
    if bytes.len() % 4 != 0 {
        return Err(RecordError::malformed(
            "payload is not a whole number of 4-byte integers",
            bytes.len(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode an id record: the first integer of a 2-byte or 4-byte payload.
pub fn decode_id(bytes: &[u8]) -> Result<i32, RecordError> {
    match bytes.len() {
        2 => Ok(i32::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
        n if n >= 4 && n % 4 == 0 => Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        n => Err(RecordError::malformed("id record is neither i16 nor i32", n)),
    }
}

// ── Record reader ───────────────────────────────────────────────

/// Reads length-framed records from a byte stream.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production code can
/// use `BufReader<File>`.
pub struct RecordReader<R: Read> {
    reader: R,
    records_read: u64,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            records_read: 0,
        }
    }

    /// Number of records consumed so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next record's payload.
    ///
    /// Returns `Ok(None)` on clean EOF (no bytes before the leading
    /// marker), or an error on truncated or inconsistent framing.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        // Read the leading marker byte-by-byte to distinguish clean EOF
        // (zero bytes available) from truncation.
        let mut head = [0u8; MARKER_BYTES];
        let mut filled = 0;
        while filled < MARKER_BYTES {
            match self.reader.read(&mut head[filled..]) {
                Ok(0) => {
                    if filled == 0 {
                        return Ok(None);
                    }
                    return Err(RecordError::UnexpectedEof {
                        detail: format!(
                            "truncated record marker: got {filled} of {MARKER_BYTES} bytes"
                        ),
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordError::Io(e)),
            }
        }
        let len = u32::from_le_bytes(head) as usize;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => RecordError::UnexpectedEof {
                detail: format!(
                    "record {} declares {len} bytes but the stream ended early",
                    self.records_read + 1
                ),
            },
            _ => RecordError::Io(e),
        })?;

        let mut tail = [0u8; MARKER_BYTES];
        self.reader.read_exact(&mut tail)?;
        let tail_len = u32::from_le_bytes(tail) as usize;
        if tail_len != len {
            return Err(RecordError::malformed(
                format!("trailing marker {tail_len} does not match leading marker {len}"),
                tail_len,
            ));
        }

        self.records_read += 1;
        Ok(Some(payload))
    }

    /// Read the next record, treating EOF as an error.
    pub fn read_record(&mut self, what: &str) -> Result<Vec<u8>, RecordError> {
        self.next_record()?.ok_or_else(|| RecordError::UnexpectedEof {
            detail: format!("expected {what} record"),
        })
    }

    /// Read a record of reals in `precision`, cast to `T`.
    pub fn read_reals<T: Real>(&mut self, what: &str, precision: Precision) -> Result<Vec<T>, RecordError> {
        let bytes = self.read_record(what)?;
        decode_reals_as(&bytes, precision)
    }

    /// Read a record of `i32`s.
    pub fn read_ints(&mut self, what: &str) -> Result<Vec<i32>, RecordError> {
        let bytes = self.read_record(what)?;
        decode_ints(&bytes)
    }

    /// Skip the next record without decoding it.
    pub fn skip_record(&mut self, what: &str) -> Result<(), RecordError> {
        self.read_record(what).map(|_| ())
    }
}
