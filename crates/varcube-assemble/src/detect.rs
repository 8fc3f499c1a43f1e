//! Snapshot format detection and processor-directory discovery.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use tracing::debug;
use varcube_core::RunParams;

use crate::config::ProcSelector;
use crate::error::ReadError;

/// Name of the single directory collective runs write to.
pub const COLLECTIVE_DIR: &str = "allprocs";

/// How a run's snapshots are laid out on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadStrategy {
    /// One self-describing container file under `allprocs/`.
    ContainerCollective,
    /// One legacy record file under `allprocs/` covering the global grid.
    LegacyCollective,
    /// One legacy record file per `proc<N>/` directory.
    LegacyPerProcess,
}

impl ReadStrategy {
    /// Whether snapshots use container file names (`var.h5`).
    pub fn is_container(self) -> bool {
        matches!(self, Self::ContainerCollective)
    }
}

/// Choose the read strategy for a run.
///
/// An `HDF5` strategy tag or a `grid.h5` in the data directory selects
/// the container reader. Otherwise a missing tag or `dist` selects the
/// legacy reader, collective or per-process depending on the run's
/// collective-I/O flag. Any other tag is unsupported.
pub fn detect_strategy(datadir: &Path, params: &RunParams) -> Result<ReadStrategy, ReadError> {
    let tag = params.io_strategy.as_deref();
    if tag == Some("HDF5") || datadir.join("grid.h5").exists() {
        return Ok(ReadStrategy::ContainerCollective);
    }
    match tag {
        None | Some("dist") if params.collective_io => Ok(ReadStrategy::LegacyCollective),
        None | Some("dist") => Ok(ReadStrategy::LegacyPerProcess),
        Some(other) => Err(ReadError::UnsupportedFormat {
            detail: format!("I/O strategy '{other}'"),
        }),
    }
}

// ── Natural ordering ───────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk<'a> {
    // Significant digit count first, so longer numbers sort later
    // without parsing into a bounded integer type.
    Num(usize, &'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let end = bytes[start..]
            .iter()
            .position(|b| b.is_ascii_digit() != digit)
            .map_or(bytes.len(), |p| start + p);
        let part = &s[start..end];
        out.push(if digit {
            let significant = part.trim_start_matches('0');
            Chunk::Num(significant.len(), significant)
        } else {
            Chunk::Text(part)
        });
        start = end;
    }
    out
}

/// Compare two names so embedded numbers order by value (`proc9` before
/// `proc10`). Ties between differently zero-padded numbers fall back to
/// plain string order, so the ordering is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    chunks(a).cmp(&chunks(b)).then_with(|| a.cmp(b))
}

/// Sort names in natural order.
pub fn natural_sort<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

// ── Processor directories ─────────────────────────────────────────

/// One directory holding a snapshot file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcDir {
    /// Directory name relative to the data directory.
    pub name: String,
    /// Processor number, `None` for the collective directory.
    pub proc: Option<usize>,
}

impl ProcDir {
    /// The `proc<N>` directory for processor `n`.
    pub fn numbered(n: usize) -> Self {
        Self {
            name: format!("proc{n}"),
            proc: Some(n),
        }
    }

    /// The collective `allprocs` directory.
    pub fn collective() -> Self {
        Self {
            name: COLLECTIVE_DIR.to_string(),
            proc: None,
        }
    }
}

/// List `proc<N>` directories under `datadir` in natural order.
///
/// `proc_bounds.dat` and entries whose suffix is not a processor number
/// are skipped.
pub fn discover_proc_dirs(datadir: &Path) -> Result<Vec<ProcDir>, ReadError> {
    let entries = fs::read_dir(datadir).map_err(|source| ReadError::Io {
        path: datadir.to_path_buf(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReadError::Io {
            path: datadir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("proc") && name != "proc_bounds.dat" {
            names.push(name);
        }
    }
    natural_sort(&mut names);

    let mut dirs = Vec::with_capacity(names.len());
    for name in names {
        match name[4..].parse::<usize>() {
            Ok(n) => dirs.push(ProcDir { name, proc: Some(n) }),
            Err(_) => debug!(entry = %name, "skipping non-processor entry"),
        }
    }
    Ok(dirs)
}

/// Directories to read for `strategy` and `selector`.
pub fn snapshot_dirs(
    datadir: &Path,
    strategy: ReadStrategy,
    selector: ProcSelector,
) -> Result<Vec<ProcDir>, ReadError> {
    match (strategy, selector) {
        (ReadStrategy::LegacyPerProcess, ProcSelector::Single(n)) => Ok(vec![ProcDir::numbered(n)]),
        (ReadStrategy::LegacyPerProcess, ProcSelector::All) => {
            let dirs = discover_proc_dirs(datadir)?;
            if dirs.is_empty() {
                return Err(ReadError::FileNotFound {
                    path: datadir.join("proc0"),
                });
            }
            Ok(dirs)
        }
        _ => Ok(vec![ProcDir::collective()]),
    }
}
