//! Metadata sources and the per-session metadata cache.
//!
//! [`FileMetadata`] resolves metadata from the text files a run writes
//! next to its snapshots:
//!
//! ```text
//! dim.dat / dim_down.dat      mx my mz mvar maux [mglobal]
//!                             precision tag (S or D)
//!                             nghostx nghosty nghostz
//!                             nprocx nprocy nprocz
//! proc<N>/dim.dat             same, last line is ipx ipy ipz
//! index.pro                   i<name>=<slot> per line
//! param.nml                   Fortran namelists (KEY=VALUE,)
//! grid.dat                    binary grid records
//! ```
//!
//! [`StaticMetadata`] serves metadata a caller already holds.
//! [`MetadataCache`] memoizes either one per data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};
use varcube_core::{
    CoordinateSystem, DimVariant, Dims, EosConstants, FieldIndex, Grid, MetadataError,
    MetadataSource, Precision, RunMetadata, RunParams,
};
use varcube_record::{read_grid_file, RecordError};

// ── FileMetadata ───────────────────────────────────────────────────

/// Resolves metadata from a run's text metadata files.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileMetadata;

fn dim_file_name(variant: DimVariant) -> &'static str {
    match variant {
        DimVariant::Standard => "dim.dat",
        DimVariant::Downsampled => "dim_down.dat",
    }
}

fn read_text(path: &Path) -> Result<String, MetadataError> {
    fs::read_to_string(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_error(path: &Path, detail: impl Into<String>) -> MetadataError {
    MetadataError::Parse {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

/// Parse a dimension file. The last line's three integers are returned
/// separately: processor counts for the global file, processor
/// coordinates for a per-processor file.
pub fn parse_dim(path: &Path, text: &str) -> Result<(Dims, [usize; 3]), MetadataError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 4 {
        return Err(parse_error(path, format!("expected 4 lines, found {}", lines.len())));
    }
    let ints = |line: &str, want: usize| -> Result<Vec<usize>, MetadataError> {
        let v: Vec<usize> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| parse_error(path, format!("'{line}': {e}")))?;
        if v.len() < want {
            return Err(parse_error(
                path,
                format!("'{line}': expected {want} integers"),
            ));
        }
        Ok(v)
    };
    let sizes = ints(lines[0], 5)?;
    let precision = Precision::from_tag(lines[1])
        .ok_or_else(|| parse_error(path, format!("unknown precision '{}'", lines[1])))?;
    let ghosts = ints(lines[2], 3)?;
    let last = ints(lines[3], 3)?;
    let dims = Dims {
        mx: sizes[0],
        my: sizes[1],
        mz: sizes[2],
        mvar: sizes[3],
        maux: sizes[4],
        nghostx: ghosts[0],
        nghosty: ghosts[1],
        nghostz: ghosts[2],
        precision,
        nprocx: 1,
        nprocy: 1,
        nprocz: 1,
        ipx: 0,
        ipy: 0,
        ipz: 0,
    };
    Ok((dims, [last[0], last[1], last[2]]))
}

/// Parse `index.pro`: every `i<name>=<slot>` line becomes an entry.
pub fn parse_index(text: &str) -> FieldIndex {
    let mut index = FieldIndex::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let Some(name) = key.strip_prefix('i') else {
            continue;
        };
        match value.trim().parse::<usize>() {
            Ok(slot) => index.insert(name, slot),
            Err(_) => debug!(entry = key, "skipping non-slot index entry"),
        }
    }
    index
}

/// Scan Fortran namelist text into upper-cased `KEY -> first value`.
///
/// The first occurrence of a key wins. Quotes are stripped, repeat
/// counts (`3*0.0`) are dropped, and only the first array element is
/// kept.
pub fn scan_namelist(text: &str) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('&') || line.starts_with('/') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let first = first_namelist_value(value);
        out.entry(key).or_insert(first);
    }
    out
}

fn first_namelist_value(raw: &str) -> String {
    let raw = raw.trim();
    let first = if let Some(rest) = raw.strip_prefix(['\'', '"']) {
        let quote = raw.as_bytes()[0] as char;
        rest.split(quote).next().unwrap_or_default()
    } else {
        raw.split(',').next().unwrap_or_default().trim()
    };
    match first.split_once('*') {
        Some((count, value)) if count.trim().parse::<usize>().is_ok() => value.trim().to_string(),
        _ => first.trim().to_string(),
    }
}

fn fortran_bool(v: &str) -> Option<bool> {
    match v.trim().trim_matches('.').to_ascii_uppercase().as_str() {
        "T" | "TRUE" => Some(true),
        "F" | "FALSE" => Some(false),
        _ => None,
    }
}

fn fortran_real(v: &str) -> Option<f64> {
    v.trim().replace(['D', 'd'], "E").parse().ok()
}

/// Build [`RunParams`] from scanned namelist entries, defaulting
/// whatever is absent.
pub fn params_from_namelist(entries: &IndexMap<String, String>) -> RunParams {
    let flag = |k: &str| entries.get(k).and_then(|v| fortran_bool(v)).unwrap_or(false);
    let real = |k: &str, default: f64| entries.get(k).and_then(|v| fortran_real(v)).unwrap_or(default);
    let eos_default = EosConstants::default();
    let coord_system = match entries.get("COORD_SYSTEM") {
        Some(name) => CoordinateSystem::from_name(name).unwrap_or_else(|| {
            warn!(coord_system = %name, "unknown coordinate system, assuming cartesian");
            CoordinateSystem::Cartesian
        }),
        None => CoordinateSystem::Cartesian,
    };
    RunParams {
        io_strategy: entries.get("IO_STRATEGY").cloned(),
        collective_io: flag("LCOLLECTIVE_IO"),
        write_aux: flag("LWRITE_AUX"),
        write_2d: flag("LWRITE_2D"),
        shear: flag("LSHEAR"),
        coord_system,
        eos: EosConstants {
            cp: real("CP", eos_default.cp),
            gamma: real("GAMMA", eos_default.gamma),
            cs0: real("CS0", eos_default.cs0),
            rho0: real("RHO0", eos_default.rho0),
        },
    }
}

impl FileMetadata {
    fn global_dims(&self, datadir: &Path, variant: DimVariant) -> Result<Dims, MetadataError> {
        let path = datadir.join(dim_file_name(variant));
        let (mut dims, nprocs) = parse_dim(&path, &read_text(&path)?)?;
        [dims.nprocx, dims.nprocy, dims.nprocz] = nprocs;
        Ok(dims)
    }
}

impl MetadataSource for FileMetadata {
    fn run_metadata(
        &self,
        datadir: &Path,
        variant: DimVariant,
    ) -> Result<RunMetadata, MetadataError> {
        let dims = self.global_dims(datadir, variant)?;

        let index_path = datadir.join("index.pro");
        let index = parse_index(&read_text(&index_path)?);

        let param_path = datadir.join("param.nml");
        let params = match fs::read_to_string(&param_path) {
            Ok(text) => params_from_namelist(&scan_namelist(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %param_path.display(), "no parameter file, using defaults");
                RunParams::default()
            }
            Err(source) => {
                return Err(MetadataError::Io {
                    path: param_path,
                    source,
                })
            }
        };

        debug!(
            datadir = %datadir.display(),
            mx = dims.mx,
            my = dims.my,
            mz = dims.mz,
            fields = index.len(),
            "resolved run metadata"
        );
        Ok(RunMetadata {
            dims,
            params,
            index,
        })
    }

    fn proc_dims(
        &self,
        datadir: &Path,
        proc: usize,
        variant: DimVariant,
    ) -> Result<Dims, MetadataError> {
        let global = self.global_dims(datadir, variant)?;
        let path = datadir.join(format!("proc{proc}")).join(dim_file_name(variant));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MetadataError::UnknownProcessor { proc })
            }
            Err(source) => return Err(MetadataError::Io { path, source }),
        };
        let (mut dims, ip) = parse_dim(&path, &text)?;
        [dims.ipx, dims.ipy, dims.ipz] = ip;
        dims.nprocx = global.nprocx;
        dims.nprocy = global.nprocy;
        dims.nprocz = global.nprocz;
        Ok(dims)
    }

    fn grid(&self, datadir: &Path, dims: &Dims) -> Result<Grid, MetadataError> {
        let path = datadir.join("grid.dat");
        match read_grid_file(&path, dims.precision, dims.mx, dims.my, dims.mz) {
            Ok(grid) => Ok(grid),
            Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Err(MetadataError::MissingGridMetadata { path })
            }
            Err(e) => Err(parse_error(&path, e.to_string())),
        }
    }
}

// ── StaticMetadata ─────────────────────────────────────────────────

/// Metadata supplied up front, independent of the data directory.
///
/// The dimension variant is ignored: callers hold one set of dims.
#[derive(Clone, Debug)]
pub struct StaticMetadata {
    run: RunMetadata,
    procs: IndexMap<usize, Dims>,
    grid: Option<Grid>,
}

impl StaticMetadata {
    /// Serve `run` with no per-processor dims and no grid.
    pub fn new(run: RunMetadata) -> Self {
        Self {
            run,
            procs: IndexMap::new(),
            grid: None,
        }
    }

    /// Register the dims of processor `proc`.
    pub fn with_proc(mut self, proc: usize, dims: Dims) -> Self {
        self.procs.insert(proc, dims);
        self
    }

    /// Serve `grid` from [`MetadataSource::grid`].
    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = Some(grid);
        self
    }
}

impl MetadataSource for StaticMetadata {
    fn run_metadata(&self, _: &Path, _: DimVariant) -> Result<RunMetadata, MetadataError> {
        Ok(self.run.clone())
    }

    fn proc_dims(&self, _: &Path, proc: usize, _: DimVariant) -> Result<Dims, MetadataError> {
        self.procs
            .get(&proc)
            .cloned()
            .ok_or(MetadataError::UnknownProcessor { proc })
    }

    fn grid(&self, datadir: &Path, _: &Dims) -> Result<Grid, MetadataError> {
        self.grid
            .clone()
            .ok_or_else(|| MetadataError::MissingGridMetadata {
                path: datadir.join("grid.dat"),
            })
    }
}

// ── MetadataCache ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RunKey {
    dir: PathBuf,
    variant: DimVariant,
}

#[derive(Debug)]
struct CachedRun {
    metadata: Arc<RunMetadata>,
    procs: IndexMap<usize, Dims>,
    // Outer `None`: not resolved yet. Inner `None`: the run has no grid.
    grid: Option<Option<Arc<Grid>>>,
}

/// Memoized metadata lookups, keyed by canonical data directory.
///
/// The cache belongs to the caller's session. Entries never expire on
/// their own; call [`invalidate`](Self::invalidate) when a run directory
/// may have changed on disk, or [`clear`](Self::clear) to drop all of
/// them.
pub struct MetadataCache {
    source: Box<dyn MetadataSource>,
    runs: IndexMap<RunKey, CachedRun>,
    hits: u64,
    misses: u64,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(FileMetadata)
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("runs", &self.runs.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

fn canonical(datadir: &Path) -> PathBuf {
    fs::canonicalize(datadir).unwrap_or_else(|_| datadir.to_path_buf())
}

impl MetadataCache {
    /// Cache lookups against `source`.
    pub fn new(source: impl MetadataSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            runs: IndexMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn entry(&mut self, datadir: &Path, variant: DimVariant) -> Result<&mut CachedRun, MetadataError> {
        let key = RunKey {
            dir: canonical(datadir),
            variant,
        };
        if self.runs.contains_key(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let metadata = self.source.run_metadata(datadir, variant)?;
            self.runs.insert(
                key.clone(),
                CachedRun {
                    metadata: Arc::new(metadata),
                    procs: IndexMap::new(),
                    grid: None,
                },
            );
        }
        self.runs
            .get_mut(&key)
            .ok_or_else(|| parse_error(datadir, "cache entry vanished"))
    }

    /// Global metadata for the run at `datadir`.
    pub fn run(&mut self, datadir: &Path, variant: DimVariant) -> Result<Arc<RunMetadata>, MetadataError> {
        Ok(Arc::clone(&self.entry(datadir, variant)?.metadata))
    }

    /// Dims of processor `proc`.
    pub fn proc_dims(
        &mut self,
        datadir: &Path,
        proc: usize,
        variant: DimVariant,
    ) -> Result<Dims, MetadataError> {
        if let Some(dims) = self.entry(datadir, variant)?.procs.get(&proc) {
            return Ok(dims.clone());
        }
        let dims = self.source.proc_dims(datadir, proc, variant)?;
        self.entry(datadir, variant)?.procs.insert(proc, dims.clone());
        Ok(dims)
    }

    /// Grid of the run, or `None` when it has no grid record.
    pub fn grid(&mut self, datadir: &Path, variant: DimVariant) -> Result<Option<Arc<Grid>>, MetadataError> {
        let entry = self.entry(datadir, variant)?;
        if let Some(grid) = &entry.grid {
            return Ok(grid.clone());
        }
        let dims = entry.metadata.dims.clone();
        let grid = match self.source.grid(datadir, &dims) {
            Ok(g) => Some(Arc::new(g)),
            Err(MetadataError::MissingGridMetadata { .. }) => None,
            Err(e) => return Err(e),
        };
        self.entry(datadir, variant)?.grid = Some(grid.clone());
        Ok(grid)
    }

    /// Drop every cached entry for `datadir`. Returns whether any existed.
    pub fn invalidate(&mut self, datadir: &Path) -> bool {
        let dir = canonical(datadir);
        let before = self.runs.len();
        self.runs.retain(|key, _| key.dir != dir);
        before != self.runs.len()
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// Number of cached runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that went to the source.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
