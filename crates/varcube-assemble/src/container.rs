//! Self-describing container snapshots.
//!
//! A container file holds every field at full global extent, so there is
//! nothing to stitch: each `data/<field>` array is copied straight into
//! its slot. Layout inside the file:
//!
//! ```text
//! data/<field>            one array per primitive field, spatial shape
//! time                    scalar
//! grid/{x,y,z}            coordinates, ghosts included
//! grid/{dx,dy,dz}         scalar spacings
//! persist/<key>           persistent values (shear offset: shear_delta_y)
//! ```
//!
//! Access goes through [`ContainerBackend`] and [`Container`]. The HDF5
//! backend is compiled with the `hdf5` feature; [`MemoryBackend`] serves
//! in-process containers.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use tracing::{debug, warn};
use varcube_core::Real;
use varcube_record::PersistValue;

use crate::config::CancelToken;
use crate::error::ReadError;
use crate::snapshot::{InteriorBounds, Snapshot, SnapshotParts};
use crate::stitch::{AssemblePlan, AssembleStrategy};

/// Key of the shear offset inside the `persist` group.
pub const SHEAR_OFFSET_KEY: &str = "shear_delta_y";

// ── Errors ─────────────────────────────────────────────────────────

/// Errors raised by a container backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerError {
    /// A file, group, or dataset does not exist.
    Missing {
        /// Path of the missing entry.
        path: String,
    },
    /// The backend failed to read an entry.
    Backend {
        /// Backend message.
        detail: String,
    },
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(f, "container entry '{path}' not found"),
            Self::Backend { detail } => write!(f, "container backend: {detail}"),
        }
    }
}

impl Error for ContainerError {}

// ── Traits ─────────────────────────────────────────────────────────

/// An open container file.
pub trait Container {
    /// Names of the datasets directly under `group`.
    fn dataset_names(&self, group: &str) -> Result<Vec<String>, ContainerError>;

    /// Read the dataset at `path` as `f64`, with its shape.
    fn read_real_array(&self, path: &str) -> Result<(Vec<f64>, Vec<usize>), ContainerError>;

    /// Whether an entry exists at `path`.
    fn contains(&self, path: &str) -> bool;
}

/// Opens container files.
pub trait ContainerBackend: Send + Sync {
    /// Open the container at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn Container>, ContainerError>;
}

// ── In-memory backend ──────────────────────────────────────────────

/// A container held in memory, keyed by dataset path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryContainer {
    datasets: IndexMap<String, (Vec<f64>, Vec<usize>)>,
}

impl MemoryContainer {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` with `shape` at `path`. Panics if the element count
    /// does not match the shape.
    pub fn insert(&mut self, path: impl Into<String>, data: Vec<f64>, shape: Vec<usize>) {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "dataset length does not match its shape"
        );
        self.datasets.insert(path.into(), (data, shape));
    }

    /// Store a scalar at `path`.
    pub fn insert_scalar(&mut self, path: impl Into<String>, value: f64) {
        self.datasets.insert(path.into(), (vec![value], Vec::new()));
    }

    /// Store a whole array at `path`.
    pub fn insert_array(&mut self, path: impl Into<String>, array: &ArrayD<f64>) {
        let data = array.iter().copied().collect();
        self.datasets.insert(path.into(), (data, array.shape().to_vec()));
    }

    /// Remove the entry at `path`.
    pub fn remove(&mut self, path: &str) -> bool {
        self.datasets.shift_remove(path).is_some()
    }
}

impl Container for MemoryContainer {
    fn dataset_names(&self, group: &str) -> Result<Vec<String>, ContainerError> {
        let prefix = format!("{group}/");
        let names: Vec<String> = self
            .datasets
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(ContainerError::Missing {
                path: group.to_string(),
            });
        }
        Ok(names)
    }

    fn read_real_array(&self, path: &str) -> Result<(Vec<f64>, Vec<usize>), ContainerError> {
        self.datasets
            .get(path)
            .cloned()
            .ok_or_else(|| ContainerError::Missing {
                path: path.to_string(),
            })
    }

    fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }
}

/// Serves [`MemoryContainer`]s registered under file paths.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    files: IndexMap<PathBuf, MemoryContainer>,
}

impl MemoryBackend {
    /// A backend with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `container` at `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>, container: MemoryContainer) -> Self {
        self.files.insert(path.into(), container);
        self
    }
}

impl ContainerBackend for MemoryBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>, ContainerError> {
        match self.files.get(path) {
            Some(c) => Ok(Box::new(c.clone())),
            None => Err(ContainerError::Missing {
                path: path.display().to_string(),
            }),
        }
    }
}

// ── HDF5 backend ───────────────────────────────────────────────────

#[cfg(feature = "hdf5")]
pub use self::h5::Hdf5Backend;

#[cfg(feature = "hdf5")]
mod h5 {
    use std::path::Path;

    use super::{Container, ContainerBackend, ContainerError};

    fn backend(e: hdf5::Error) -> ContainerError {
        ContainerError::Backend {
            detail: e.to_string(),
        }
    }

    /// Opens HDF5 files read-only.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Hdf5Backend;

    struct Hdf5Container {
        file: hdf5::File,
    }

    impl Hdf5Container {
        fn require(&self, path: &str) -> Result<(), ContainerError> {
            if self.file.link_exists(path) {
                Ok(())
            } else {
                Err(ContainerError::Missing {
                    path: path.to_string(),
                })
            }
        }
    }

    impl Container for Hdf5Container {
        fn dataset_names(&self, group: &str) -> Result<Vec<String>, ContainerError> {
            self.require(group)?;
            let group = self.file.group(group).map_err(backend)?;
            let mut names = Vec::new();
            for name in group.member_names().map_err(backend)? {
                if group.dataset(&name).is_ok() {
                    names.push(name);
                }
            }
            Ok(names)
        }

        fn read_real_array(&self, path: &str) -> Result<(Vec<f64>, Vec<usize>), ContainerError> {
            self.require(path)?;
            let ds = self.file.dataset(path).map_err(backend)?;
            let data = ds.read_raw::<f64>().map_err(backend)?;
            Ok((data, ds.shape()))
        }

        fn contains(&self, path: &str) -> bool {
            self.file.link_exists(path)
        }
    }

    impl ContainerBackend for Hdf5Backend {
        fn open(&self, path: &Path) -> Result<Box<dyn Container>, ContainerError> {
            if !path.exists() {
                return Err(ContainerError::Missing {
                    path: path.display().to_string(),
                });
            }
            let file = hdf5::File::open(path).map_err(backend)?;
            Ok(Box::new(Hdf5Container { file }))
        }
    }
}

// ── Strategy ───────────────────────────────────────────────────────

/// Assembles collective container snapshots.
pub struct ContainerStrategy<'a> {
    backend: &'a dyn ContainerBackend,
}

impl<'a> ContainerStrategy<'a> {
    /// Read containers through `backend`.
    pub fn new(backend: &'a dyn ContainerBackend) -> Self {
        Self { backend }
    }
}

impl fmt::Debug for ContainerStrategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerStrategy").finish_non_exhaustive()
    }
}

fn scalar(c: &dyn Container, path: &str) -> Result<f64, ContainerError> {
    let (data, _) = c.read_real_array(path)?;
    data.first().copied().ok_or_else(|| ContainerError::Backend {
        detail: format!("'{path}' is empty"),
    })
}

fn cast<T: Real>(values: Vec<f64>) -> Vec<T> {
    values.into_iter().map(T::from_f64_lossy).collect()
}

impl<T: Real> AssembleStrategy<T> for ContainerStrategy<'_> {
    fn assemble(&self, plan: &AssemblePlan, cancel: &CancelToken) -> Result<Snapshot<T>, ReadError> {
        let sub = plan
            .subdomains
            .first()
            .ok_or_else(|| ReadError::layout("no container file to read"))?;
        let path = &sub.path;
        let wrap = |source: ContainerError| match source {
            ContainerError::Missing { path: ref missing } if Path::new(missing) == path.as_path() => {
                ReadError::FileNotFound { path: path.clone() }
            }
            source => ReadError::Container {
                path: path.clone(),
                source,
            },
        };
        let file = self.backend.open(path).map_err(wrap)?;
        let file = file.as_ref();

        let dims = &plan.metadata.dims;
        let vars = plan.metadata.total_vars();
        let spatial = plan.layout.spatial_shape(dims);
        let mut f = ArrayD::<T>::zeros(IxDyn(&plan.layout.shape(vars, dims)));

        let index = &plan.metadata.index;
        for name in file.dataset_names("data").map_err(wrap)? {
            if cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            let Some(slot) = index.slot(&name).filter(|&s| s > 0 && s <= vars) else {
                debug!(field = %name, "container field has no slot, skipping");
                continue;
            };
            let (data, shape) = file.read_real_array(&format!("data/{name}")).map_err(wrap)?;
            if shape.as_slice() != spatial.as_slice() {
                return Err(ReadError::layout(format!(
                    "container field '{name}' has shape {shape:?}, expected {:?}",
                    spatial.as_slice()
                )));
            }
            let data = cast::<T>(data);
            let src = ArrayViewD::from_shape(IxDyn(&shape), &data)
                .map_err(|e| ReadError::layout(format!("container field '{name}': {e}")))?;
            f.index_axis_mut(Axis(0), slot - 1).assign(&src);
        }

        let t = scalar(file, "time").map_err(wrap)?;
        let coords = |axis: &str| -> Result<Vec<T>, ReadError> {
            let (data, _) = file.read_real_array(&format!("grid/{axis}")).map_err(wrap)?;
            Ok(cast(data))
        };
        let (x, y, z) = (coords("x")?, coords("y")?, coords("z")?);
        let dx = scalar(file, "grid/dx").map_err(wrap)?;
        let dy = scalar(file, "grid/dy").map_err(wrap)?;
        let dz = scalar(file, "grid/dz").map_err(wrap)?;

        let shear_key = format!("persist/{SHEAR_OFFSET_KEY}");
        let deltay = if plan.metadata.params.shear {
            match scalar(file, &shear_key) {
                Ok(v) => Some(T::from_f64_lossy(v)),
                Err(ContainerError::Missing { .. }) => {
                    warn!(path = %path.display(), "sheared run without a shear offset");
                    None
                }
                Err(e) => return Err(wrap(e)),
            }
        } else {
            None
        };

        let mut persist = IndexMap::new();
        if plan.persist {
            match file.dataset_names("persist") {
                Ok(names) => {
                    for name in names {
                        let (data, _) = file
                            .read_real_array(&format!("persist/{name}"))
                            .map_err(wrap)?;
                        persist.insert(name, PersistValue::Real(data));
                    }
                }
                Err(ContainerError::Missing { .. }) => {
                    debug!(path = %path.display(), "container has no persistent values");
                }
                Err(e) => return Err(wrap(e)),
            }
        }

        debug!(path = %path.display(), vars, "read container snapshot");
        Ok(Snapshot::from_parts(SnapshotParts {
            f,
            layout: plan.layout,
            x,
            y,
            z,
            t: T::from_f64_lossy(t),
            dx: T::from_f64_lossy(dx),
            dy: T::from_f64_lossy(dy),
            dz: T::from_f64_lossy(dz),
            deltay,
            bounds: InteriorBounds::from_dims(dims),
            metadata: plan.metadata.clone(),
            persist,
            grid: plan.grid.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use varcube_test_utils::SyntheticRun;

    use crate::detect::{ProcDir, ReadStrategy};
    use crate::stitch::SubdomainDescriptor;

    fn container_for(run: &SyntheticRun) -> MemoryContainer {
        let mut c = MemoryContainer::new();
        let f = run.global_f();
        for (name, slot) in run.index().iter() {
            if slot <= run.total_vars() {
                let field = f.index_axis(Axis(0), slot - 1).to_owned();
                c.insert_array(format!("data/{name}"), &field);
            }
        }
        c.insert_scalar("time", run.t);
        let [x, y, z] = run.global_coords();
        for (axis, v) in [("x", x), ("y", y), ("z", z)] {
            let n = v.len();
            c.insert(format!("grid/{axis}"), v, vec![n]);
        }
        for (axis, h) in ["dx", "dy", "dz"].iter().zip(run.spacing) {
            c.insert_scalar(format!("grid/{axis}"), h);
        }
        c
    }

    fn plan(run: &SyntheticRun, path: &Path, persist: bool) -> AssemblePlan {
        AssemblePlan {
            datadir: PathBuf::from("/run"),
            strategy: ReadStrategy::ContainerCollective,
            metadata: Arc::new(run.metadata()),
            layout: run.layout(),
            subdomains: vec![SubdomainDescriptor {
                dir: ProcDir::collective(),
                path: path.to_path_buf(),
                dims: run.global_dims(),
            }],
            persist,
            workers: 1,
            grid: None,
        }
    }

    #[test]
    fn fields_land_in_their_slots() {
        let run = SyntheticRun::new(4, 3, 2)
            .vector(["ux", "uy", "uz"])
            .scalar("lnrho")
            .time(2.5)
            .io_strategy(Some("HDF5"));
        let path = PathBuf::from("/run/allprocs/var.h5");
        let backend = MemoryBackend::new().with_file(&path, container_for(&run));
        let snap: Snapshot<f64> = ContainerStrategy::new(&backend)
            .assemble(&plan(&run, &path, false), &CancelToken::new())
            .unwrap();
        assert_eq!(snap.f(), &run.global_f());
        assert_eq!(snap.t(), 2.5);
        assert_eq!(snap.x().to_vec(), run.global_coords()[0]);
        assert_eq!(snap.spacing(), (0.1, 0.2, 0.3));
        assert!(snap.deltay().is_none());
    }

    #[test]
    fn shear_offset_and_persist_group() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho").shear(0.75);
        let path = PathBuf::from("/run/allprocs/VAR3.h5");
        let mut c = container_for(&run);
        c.insert_scalar("persist/shear_delta_y", 0.75);
        c.insert("persist/forcing_location", vec![1.0, 2.0, 3.0], vec![3]);
        let backend = MemoryBackend::new().with_file(&path, c);
        let snap: Snapshot<f32> = ContainerStrategy::new(&backend)
            .assemble(&plan(&run, &path, true), &CancelToken::new())
            .unwrap();
        assert_eq!(snap.deltay(), Some(0.75));
        assert_eq!(snap.persist()["forcing_location"].len(), 3);
        assert!(snap.persist().contains_key("shear_delta_y"));
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho");
        let path = PathBuf::from("/run/allprocs/var.h5");
        let err = <ContainerStrategy<'_> as AssembleStrategy<f64>>::assemble(
            &ContainerStrategy::new(&MemoryBackend::new()),
            &plan(&run, &path, false),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ReadError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_field_shape_is_a_layout_error() {
        let run = SyntheticRun::new(4, 3, 2).scalar("lnrho");
        let path = PathBuf::from("/run/allprocs/var.h5");
        let mut c = container_for(&run);
        c.insert("data/lnrho", vec![0.0; 6], vec![2, 3]);
        let backend = MemoryBackend::new().with_file(&path, c);
        let err = <ContainerStrategy<'_> as AssembleStrategy<f64>>::assemble(
            &ContainerStrategy::new(&backend),
            &plan(&run, &path, false),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ReadError::Layout { .. }));
    }

    #[test]
    fn missing_time_is_a_container_error() {
        let run = SyntheticRun::new(2, 2, 2).scalar("lnrho");
        let path = PathBuf::from("/run/allprocs/var.h5");
        let mut c = container_for(&run);
        assert!(c.remove("time"));
        let backend = MemoryBackend::new().with_file(&path, c);
        let err = <ContainerStrategy<'_> as AssembleStrategy<f64>>::assemble(
            &ContainerStrategy::new(&backend),
            &plan(&run, &path, false),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReadError::Container {
                source: ContainerError::Missing { .. },
                ..
            }
        ));
    }

    #[test]
    fn group_listing_is_one_level_deep() {
        let mut c = MemoryContainer::new();
        c.insert_scalar("grid/dx", 0.1);
        c.insert_scalar("grid/sub/x", 0.1);
        assert_eq!(c.dataset_names("grid").unwrap(), ["dx"]);
        assert!(c.dataset_names("data").is_err());
        assert!(c.contains("grid/sub/x"));
    }
}
