//! The assembled [`Snapshot`] and its ghost-cell trimming.
//!
//! A snapshot owns one dynamic-rank tensor `f` of shape
//! `[variables, spatial...]`. Named fields are [`FieldView`]s: slot
//! ranges into `f` resolved to array views on demand, never copies.
//! Derived fields are separately owned arrays whose trailing axes match
//! the spatial shape of `f`.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array1, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Slice};
use varcube_core::{
    DeriveError, Dims, Grid, Layout, Real, RunMetadata, SpatialAxis,
};
use varcube_record::PersistValue;

// ── InteriorBounds ─────────────────────────────────────────────────

/// Half-open interior index ranges per spatial axis.
///
/// In inclusive notation these are `[l1, l2]`, `[m1, m2]`, `[n1, n2]`
/// along x, y, z.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteriorBounds {
    /// `l1..l2 + 1`.
    pub x: Range<usize>,
    /// `m1..m2 + 1`.
    pub y: Range<usize>,
    /// `n1..n2 + 1`.
    pub z: Range<usize>,
}

impl InteriorBounds {
    /// Interior of a block with dimensions `dims`.
    pub fn from_dims(dims: &Dims) -> Self {
        Self {
            x: dims.interior_range(SpatialAxis::X),
            y: dims.interior_range(SpatialAxis::Y),
            z: dims.interior_range(SpatialAxis::Z),
        }
    }

    /// Range along `axis`.
    pub fn range(&self, axis: SpatialAxis) -> Range<usize> {
        match axis {
            SpatialAxis::X => self.x.clone(),
            SpatialAxis::Y => self.y.clone(),
            SpatialAxis::Z => self.z.clone(),
        }
    }
}

// ── FieldView ──────────────────────────────────────────────────────

/// A named slot range into the snapshot tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldView {
    /// 0-based slots along the variable axis.
    pub slots: Range<usize>,
}

impl FieldView {
    /// Whether the view covers one slot (and resolves without the
    /// variable axis).
    pub fn is_scalar(&self) -> bool {
        self.slots.len() == 1
    }
}

// ── TrimError ──────────────────────────────────────────────────────

/// Errors from [`Snapshot::trim`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrimError {
    /// The snapshot was already trimmed. Trimming is not idempotent.
    AlreadyTrimmed,
    /// An interior bound lies outside the array.
    BoundsExceedExtent {
        /// Axis being trimmed.
        axis: SpatialAxis,
        /// Upper bound requested.
        bound: usize,
        /// Extent available.
        extent: usize,
    },
}

impl fmt::Display for TrimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTrimmed => write!(f, "snapshot is already trimmed"),
            Self::BoundsExceedExtent {
                axis,
                bound,
                extent,
            } => write!(
                f,
                "interior bound {bound} along {axis} exceeds extent {extent}"
            ),
        }
    }
}

impl std::error::Error for TrimError {}

// ── Snapshot ───────────────────────────────────────────────────────

/// Everything needed to build a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotParts<T> {
    /// Field tensor `[variables, spatial...]`.
    pub f: ArrayD<T>,
    /// Storage layout of the spatial axes.
    pub layout: Layout,
    /// x coordinates.
    pub x: Vec<T>,
    /// y coordinates.
    pub y: Vec<T>,
    /// z coordinates.
    pub z: Vec<T>,
    /// Time.
    pub t: T,
    /// Spacing along x.
    pub dx: T,
    /// Spacing along y.
    pub dy: T,
    /// Spacing along z.
    pub dz: T,
    /// Shearing-box offset.
    pub deltay: Option<T>,
    /// Interior bounds of `f`.
    pub bounds: InteriorBounds,
    /// Run metadata the snapshot was read against.
    pub metadata: Arc<RunMetadata>,
    /// Persistent values.
    pub persist: IndexMap<String, PersistValue>,
    /// Grid record, when the run has one.
    pub grid: Option<Arc<Grid>>,
}

/// One assembled snapshot.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    f: ArrayD<T>,
    layout: Layout,
    x: Array1<T>,
    y: Array1<T>,
    z: Array1<T>,
    t: T,
    dx: T,
    dy: T,
    dz: T,
    deltay: Option<T>,
    bounds: InteriorBounds,
    trimmed: bool,
    views: IndexMap<String, FieldView>,
    derived: IndexMap<String, ArrayD<T>>,
    derive_failures: IndexMap<String, DeriveError>,
    persist: IndexMap<String, PersistValue>,
    metadata: Arc<RunMetadata>,
    grid: Option<Arc<Grid>>,
}

impl<T: Real> Snapshot<T> {
    /// Assemble a snapshot and resolve its named views from the field
    /// index. Slots past the tensor's variable count (auxiliaries that
    /// were not written) get no view.
    pub fn from_parts(parts: SnapshotParts<T>) -> Self {
        let vars = parts.f.len_of(Axis(0));
        let index = &parts.metadata.index;
        let mut views = IndexMap::new();
        for (name, slot) in index.scalar_names() {
            if slot <= vars {
                views.insert(
                    name.to_string(),
                    FieldView {
                        slots: slot - 1..slot,
                    },
                );
            }
        }
        let groups = index
            .named_vectors()
            .into_iter()
            .chain(index.test_groups("aatest"))
            .chain(index.test_groups("uutest"));
        for group in groups {
            if group.slots.end <= vars {
                views.insert(group.name, FieldView { slots: group.slots });
            }
        }

        Self {
            f: parts.f,
            layout: parts.layout,
            x: Array1::from(parts.x),
            y: Array1::from(parts.y),
            z: Array1::from(parts.z),
            t: parts.t,
            dx: parts.dx,
            dy: parts.dy,
            dz: parts.dz,
            deltay: parts.deltay,
            bounds: parts.bounds,
            trimmed: false,
            views,
            derived: IndexMap::new(),
            derive_failures: IndexMap::new(),
            persist: parts.persist,
            metadata: parts.metadata,
            grid: parts.grid,
        }
    }

    /// The full field tensor.
    pub fn f(&self) -> &ArrayD<T> {
        &self.f
    }

    /// Storage layout of the spatial axes.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Shape of one variable slot.
    pub fn spatial_shape(&self) -> &[usize] {
        &self.f.shape()[1..]
    }

    /// x coordinates.
    pub fn x(&self) -> &Array1<T> {
        &self.x
    }

    /// y coordinates.
    pub fn y(&self) -> &Array1<T> {
        &self.y
    }

    /// z coordinates.
    pub fn z(&self) -> &Array1<T> {
        &self.z
    }

    /// Simulation time.
    pub fn t(&self) -> T {
        self.t
    }

    /// Grid spacings `(dx, dy, dz)`.
    pub fn spacing(&self) -> (T, T, T) {
        (self.dx, self.dy, self.dz)
    }

    /// Shearing-box offset, for sheared runs.
    pub fn deltay(&self) -> Option<T> {
        self.deltay
    }

    /// Interior bounds. After trimming these describe the trimmed region
    /// in the coordinates of the original array.
    pub fn bounds(&self) -> &InteriorBounds {
        &self.bounds
    }

    /// Whether ghost cells have been removed.
    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    /// Run metadata.
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Grid record, when the run has one.
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_deref()
    }

    /// Persistent values.
    pub fn persist(&self) -> &IndexMap<String, PersistValue> {
        &self.persist
    }

    /// Named views in index order.
    pub fn views(&self) -> &IndexMap<String, FieldView> {
        &self.views
    }

    /// Derived arrays in derivation order.
    pub fn derived(&self) -> &IndexMap<String, ArrayD<T>> {
        &self.derived
    }

    /// Derived fields that could not be computed.
    pub fn derive_failures(&self) -> &IndexMap<String, DeriveError> {
        &self.derive_failures
    }

    fn resolve<'a>(f: &'a ArrayD<T>, view: &FieldView) -> ArrayViewD<'a, T> {
        if view.is_scalar() {
            f.index_axis(Axis(0), view.slots.start)
        } else {
            f.slice_axis(Axis(0), Slice::from(view.slots.clone()))
        }
    }

    /// The named primitive field, aliasing `f`.
    ///
    /// Single-slot fields drop the variable axis; vector fields keep it.
    pub fn field(&self, name: &str) -> Option<ArrayViewD<'_, T>> {
        let view = self.views.get(name)?;
        Some(Self::resolve(&self.f, view))
    }

    /// Mutable access to a named primitive field.
    pub fn field_mut(&mut self, name: &str) -> Option<ArrayViewMutD<'_, T>> {
        let view = self.views.get(name)?.clone();
        Some(if view.is_scalar() {
            self.f.index_axis_mut(Axis(0), view.slots.start)
        } else {
            self.f.slice_axis_mut(Axis(0), Slice::from(view.slots))
        })
    }

    /// A primitive or derived field by name. Primitive fields win.
    pub fn lookup(&self, name: &str) -> Option<ArrayViewD<'_, T>> {
        self.field(name)
            .or_else(|| self.derived.get(name).map(|a| a.view()))
    }

    /// Whether `name` is available as a primitive or derived field.
    pub fn has(&self, name: &str) -> bool {
        self.views.contains_key(name) || self.derived.contains_key(name)
    }

    /// Store a derived field. Its trailing axes must match the spatial
    /// shape of `f`.
    pub fn insert_derived(&mut self, name: impl Into<String>, array: ArrayD<T>) -> Result<(), DeriveError> {
        let name = name.into();
        let spatial = self.spatial_shape();
        let shape = array.shape();
        if shape.len() < spatial.len() || &shape[shape.len() - spatial.len()..] != spatial {
            return Err(DeriveError::ShapeMismatch {
                detail: format!(
                    "derived '{name}' has shape {shape:?}, spatial shape is {spatial:?}"
                ),
            });
        }
        self.derive_failures.shift_remove(&name);
        self.derived.insert(name, array);
        Ok(())
    }

    /// Record why a derived field could not be computed.
    pub fn record_failure(&mut self, name: impl Into<String>, error: DeriveError) {
        self.derive_failures.insert(name.into(), error);
    }

    /// Remove ghost cells from `f`, every derived array, and the
    /// coordinate vectors.
    ///
    /// Not idempotent: a second call returns [`TrimError::AlreadyTrimmed`].
    pub fn trim(&mut self) -> Result<(), TrimError> {
        if self.trimmed {
            return Err(TrimError::AlreadyTrimmed);
        }
        let axes = self.layout.axes();
        let ranges: Vec<Range<usize>> = axes.iter().map(|&a| self.bounds.range(a)).collect();
        for (k, &axis) in axes.iter().enumerate() {
            let extent = self.f.len_of(Axis(k + 1));
            if ranges[k].end > extent {
                return Err(TrimError::BoundsExceedExtent {
                    axis,
                    bound: ranges[k].end,
                    extent,
                });
            }
        }
        for (coords, axis) in [(&self.x, SpatialAxis::X), (&self.y, SpatialAxis::Y), (&self.z, SpatialAxis::Z)] {
            let r = self.bounds.range(axis);
            if r.end > coords.len() {
                return Err(TrimError::BoundsExceedExtent {
                    axis,
                    bound: r.end,
                    extent: coords.len(),
                });
            }
        }

        self.f = trim_trailing(&self.f, &ranges);
        for array in self.derived.values_mut() {
            *array = trim_trailing(array, &ranges);
        }
        let slice1 = |a: &Array1<T>, r: Range<usize>| a.slice_axis(Axis(0), Slice::from(r)).to_owned();
        self.x = slice1(&self.x, self.bounds.x.clone());
        self.y = slice1(&self.y, self.bounds.y.clone());
        self.z = slice1(&self.z, self.bounds.z.clone());
        self.trimmed = true;
        Ok(())
    }
}

/// Slice the trailing `ranges.len()` axes of `a`, leaving leading axes
/// whole.
fn trim_trailing<T: Clone>(a: &ArrayD<T>, ranges: &[Range<usize>]) -> ArrayD<T> {
    let lead = a.ndim() - ranges.len();
    a.slice_each_axis(|desc| {
        let i = desc.axis.index();
        if i < lead {
            Slice::from(..)
        } else {
            Slice::from(ranges[i - lead].clone())
        }
    })
    .to_owned()
}
