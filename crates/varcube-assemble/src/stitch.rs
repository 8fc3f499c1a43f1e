//! Placing ghost-padded subdomains into the global array.
//!
//! Neighbouring subdomains overlap by their ghost margins. Ownership is
//! decided per axis: the processor at coordinate 0 contributes its whole
//! extent, every other processor skips its lower ghost margin.
//!
//! ```text
//! coord 0:   global [0, m)             local [0, m)
//! coord c:   global [c·n + g, c·n + m)  local [g, m)      n = m − 2g
//! ```
//!
//! The upper ghost margin of processor `c` is overwritten by processor
//! `c + 1`, which holds the same cells as interior. Only the last
//! processor's upper margin survives, which is the global upper ghost
//! margin.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};
use smallvec::SmallVec;
use tracing::{debug, warn};
use varcube_core::{Dims, Grid, Layout, Real, RunMetadata, SpatialAxis};
use varcube_record::{BlockSpec, PersistValue, RawBlock};

use crate::config::CancelToken;
use crate::detect::{ProcDir, ReadStrategy};
use crate::error::ReadError;
use crate::snapshot::{InteriorBounds, Snapshot, SnapshotParts};
use crate::worker::{decode_in_order, DecodeJob};

// ── Placement ──────────────────────────────────────────────────────

/// Where one subdomain's cells go along one axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisPlacement {
    /// Destination range in the global array.
    pub global: Range<usize>,
    /// Source range in the local array.
    pub local: Range<usize>,
}

/// Placement along one axis for a subdomain at processor coordinate
/// `coord` with `ghost` cells per side and local extent `extent`.
///
/// Returns `None` when the extent cannot hold both ghost margins.
pub fn axis_placement(coord: usize, ghost: usize, extent: usize) -> Option<AxisPlacement> {
    let interior = extent.checked_sub(2 * ghost)?;
    Some(if coord == 0 {
        AxisPlacement {
            global: 0..extent,
            local: 0..extent,
        }
    } else {
        let base = coord * interior;
        AxisPlacement {
            global: base + ghost..base + extent,
            local: ghost..extent,
        }
    })
}

// ── Plan ───────────────────────────────────────────────────────────

/// One snapshot file and the dims it was written with.
#[derive(Clone, Debug, PartialEq)]
pub struct SubdomainDescriptor {
    /// Directory the file lives in.
    pub dir: ProcDir,
    /// Full path of the snapshot file.
    pub path: PathBuf,
    /// Dimensions of the block. Global dims for collective files.
    pub dims: Dims,
}

/// Everything resolved before any snapshot data is read.
#[derive(Clone, Debug)]
pub struct AssemblePlan {
    /// Run directory.
    pub datadir: PathBuf,
    /// Detected on-disk layout.
    pub strategy: ReadStrategy,
    /// Global run metadata.
    pub metadata: Arc<RunMetadata>,
    /// Storage layout of the field tensor.
    pub layout: Layout,
    /// Files to read, in natural order.
    pub subdomains: Vec<SubdomainDescriptor>,
    /// Whether to decode persistent values.
    pub persist: bool,
    /// Decode worker count.
    pub workers: usize,
    /// Grid record, when the run has one.
    pub grid: Option<Arc<Grid>>,
}

impl AssemblePlan {
    fn block_spec(&self, dims: &Dims) -> BlockSpec {
        BlockSpec {
            precision: dims.precision,
            mx: dims.mx,
            my: dims.my,
            mz: dims.mz,
            cells: self.layout.cells(dims),
            total_vars: self.metadata.total_vars(),
            shear: self.metadata.params.shear,
            read_persist: self.persist,
        }
    }

    fn jobs(&self) -> Vec<DecodeJob> {
        self.subdomains
            .iter()
            .map(|s| DecodeJob {
                path: s.path.clone(),
                spec: self.block_spec(&s.dims),
            })
            .collect()
    }
}

/// Turns a plan into a snapshot.
pub trait AssembleStrategy<T: Real> {
    /// Read every file in `plan` and assemble one snapshot.
    fn assemble(&self, plan: &AssemblePlan, cancel: &CancelToken) -> Result<Snapshot<T>, ReadError>;
}

// ── GlobalAssembly ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
struct Scalars<T> {
    t: T,
    dx: T,
    dy: T,
    dz: T,
    deltay: Option<T>,
}

/// Accumulates placed subdomains into the global tensor.
#[derive(Debug)]
pub struct GlobalAssembly<T> {
    f: ArrayD<T>,
    coords: [Vec<T>; 3],
    layout: Layout,
    global: Dims,
    vars: usize,
    scalars: Option<Scalars<T>>,
    persist: IndexMap<String, PersistValue>,
    placed: usize,
}

fn axis_slot(axis: SpatialAxis) -> usize {
    match axis {
        SpatialAxis::X => 0,
        SpatialAxis::Y => 1,
        SpatialAxis::Z => 2,
    }
}

impl<T: Real> GlobalAssembly<T> {
    /// A zeroed global tensor for `vars` slots over `global`.
    pub fn new(layout: Layout, global: &Dims, vars: usize) -> Self {
        let zeros = |n: usize| vec![T::zero(); n];
        Self {
            f: ArrayD::zeros(IxDyn(&layout.shape(vars, global))),
            coords: [zeros(global.mx), zeros(global.my), zeros(global.mz)],
            layout,
            global: global.clone(),
            vars,
            scalars: None,
            persist: IndexMap::new(),
            placed: 0,
        }
    }

    /// Number of subdomains placed so far.
    pub fn placed(&self) -> usize {
        self.placed
    }

    /// Copy the owned region of `block`, written with `dims`, into the
    /// global tensor and coordinate vectors.
    pub fn place(&mut self, dims: &Dims, block: RawBlock<T>) -> Result<(), ReadError> {
        let mut placements: [Option<AxisPlacement>; 3] = [None, None, None];
        for axis in SpatialAxis::ALL {
            let extent = dims.extent(axis);
            let p = axis_placement(dims.proc_coord(axis), dims.ghost(axis), extent).ok_or_else(|| {
                ReadError::layout(format!(
                    "extent {extent} along {axis} is smaller than two ghost margins"
                ))
            })?;
            let global_extent = self.global.extent(axis);
            if p.global.end > global_extent {
                return Err(ReadError::layout(format!(
                    "processor {} along {axis} reaches index {}, global extent is {global_extent}",
                    dims.proc_coord(axis),
                    p.global.end
                )));
            }
            placements[axis_slot(axis)] = Some(p);
        }
        let [Some(px), Some(py), Some(pz)] = placements else {
            return Err(ReadError::layout("incomplete placement"));
        };
        let placements = [px, py, pz];

        let local_shape = self.layout.shape(self.vars, dims);
        if block.vars != self.vars {
            return Err(ReadError::layout(format!(
                "block has {} variables, global tensor has {}",
                block.vars, self.vars
            )));
        }
        let src = ArrayViewD::from_shape(IxDyn(&local_shape), &block.data)
            .map_err(|e| ReadError::layout(format!("block shape {local_shape:?}: {e}")))?;

        let axes = self.layout.axes();
        let ranges = |pick: fn(&AxisPlacement) -> Range<usize>| -> SmallVec<[Range<usize>; 3]> {
            axes.iter().map(|&a| pick(&placements[axis_slot(a)])).collect()
        };
        let local = ranges(|p| p.local.clone());
        let global = ranges(|p| p.global.clone());
        let src = src.slice_each_axis(|d| match d.axis.index() {
            0 => Slice::from(..),
            k => Slice::from(local[k - 1].clone()),
        });
        self.f
            .slice_each_axis_mut(|d| match d.axis.index() {
                0 => Slice::from(..),
                k => Slice::from(global[k - 1].clone()),
            })
            .assign(&src);

        let c = &block.coords;
        for (axis, values) in [(SpatialAxis::X, &c.x), (SpatialAxis::Y, &c.y), (SpatialAxis::Z, &c.z)] {
            let p = &placements[axis_slot(axis)];
            let dest = &mut self.coords[axis_slot(axis)][p.global.clone()];
            for (d, &v) in dest.iter_mut().zip(&values[p.local.clone()]) {
                *d = T::from_f64_lossy(v);
            }
        }

        let next = Scalars {
            t: T::from_f64_lossy(c.t),
            dx: T::from_f64_lossy(c.dx),
            dy: T::from_f64_lossy(c.dy),
            dz: T::from_f64_lossy(c.dz),
            deltay: c.deltay.map(T::from_f64_lossy),
        };
        if let Some(prev) = self.scalars {
            if prev.t != next.t {
                warn!(previous = %prev.t, current = %next.t, "subdomains disagree on time");
            }
            if (prev.dx, prev.dy, prev.dz) != (next.dx, next.dy, next.dz) {
                warn!("subdomains disagree on grid spacing");
            }
        }
        self.scalars = Some(next);
        self.persist.extend(block.persist);
        self.placed += 1;
        Ok(())
    }

    /// Finish the global snapshot.
    pub fn finish(
        self,
        metadata: Arc<RunMetadata>,
        grid: Option<Arc<Grid>>,
    ) -> Result<Snapshot<T>, ReadError> {
        let s = self
            .scalars
            .ok_or_else(|| ReadError::layout("no subdomain was placed"))?;
        let [x, y, z] = self.coords;
        Ok(Snapshot::from_parts(SnapshotParts {
            f: self.f,
            layout: self.layout,
            x,
            y,
            z,
            t: s.t,
            dx: s.dx,
            dy: s.dy,
            dz: s.dz,
            deltay: s.deltay,
            bounds: InteriorBounds::from_dims(&self.global),
            metadata,
            persist: self.persist,
            grid,
        }))
    }
}

// ── LegacyStrategy ─────────────────────────────────────────────────

/// Assembles legacy record snapshots, per-process or collective.
#[derive(Clone, Copy, Debug, Default)]
pub struct LegacyStrategy;

fn grid_matches(grid: &Grid, dims: &Dims) -> bool {
    grid.x.len() == dims.mx && grid.y.len() == dims.my && grid.z.len() == dims.mz
}

impl LegacyStrategy {
    /// One file, returned as written.
    fn single<T: Real>(
        &self,
        plan: &AssemblePlan,
        sub: &SubdomainDescriptor,
        cancel: &CancelToken,
    ) -> Result<Snapshot<T>, ReadError> {
        let jobs = plan.jobs();
        let mut out = None;
        decode_in_order::<T, _>(&jobs[..1], 1, cancel, |_, block| {
            out = Some(block);
            Ok(())
        })?;
        let block = out.ok_or_else(|| ReadError::layout("subdomain produced no block"))?;
        let shape = plan.layout.shape(block.vars, &sub.dims);
        let f = ArrayD::from_shape_vec(IxDyn(&shape), block.data)
            .map_err(|e| ReadError::layout(format!("block shape {shape:?}: {e}")))?;
        let c = block.coords;
        let cast = |v: Vec<f64>| v.into_iter().map(T::from_f64_lossy).collect::<Vec<T>>();
        Ok(Snapshot::from_parts(SnapshotParts {
            f,
            layout: plan.layout,
            x: cast(c.x),
            y: cast(c.y),
            z: cast(c.z),
            t: T::from_f64_lossy(c.t),
            dx: T::from_f64_lossy(c.dx),
            dy: T::from_f64_lossy(c.dy),
            dz: T::from_f64_lossy(c.dz),
            deltay: c.deltay.map(T::from_f64_lossy),
            bounds: InteriorBounds::from_dims(&sub.dims),
            metadata: plan.metadata.clone(),
            persist: block.persist,
            grid: plan.grid.clone().filter(|g| grid_matches(g, &sub.dims)),
        }))
    }
}

impl<T: Real> AssembleStrategy<T> for LegacyStrategy {
    fn assemble(&self, plan: &AssemblePlan, cancel: &CancelToken) -> Result<Snapshot<T>, ReadError> {
        match plan.subdomains.as_slice() {
            [] => Err(ReadError::layout("no subdomains to read")),
            [sub] => self.single(plan, sub, cancel),
            subs => {
                let global = &plan.metadata.dims;
                let mut assembly = GlobalAssembly::<T>::new(plan.layout, global, plan.metadata.total_vars());
                decode_in_order::<T, _>(&plan.jobs(), plan.workers, cancel, |idx, block| {
                    assembly.place(&subs[idx].dims, block)
                })?;
                debug!(
                    subdomains = assembly.placed(),
                    workers = plan.workers,
                    "stitched global snapshot"
                );
                assembly.finish(plan.metadata.clone(), plan.grid.clone())
            }
        }
    }
}
