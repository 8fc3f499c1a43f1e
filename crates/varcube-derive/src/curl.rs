//! Curl operators over the snapshot grid.
//!
//! [`CentralCurl`] uses sixth-order central differences:
//!
//! ```text
//! f'(i)  = h⁻¹/60  · ( 45 (f[i+1] − f[i−1]) − 9 (f[i+2] − f[i−2]) + (f[i+3] − f[i−3]) )
//! f''(i) = h⁻²/180 · ( −490 f[i] + 270 (f[i+1] + f[i−1]) − 27 (f[i+2] + f[i−2]) + 2 (f[i+3] + f[i−3]) )
//! ```
//!
//! Derivatives are evaluated on interior cells only; ghost cells of every
//! output are zero. An axis with at most one interior cell (or dropped
//! by a reduced layout) contributes a zero derivative.

use std::ops::Range;

use ndarray::{stack, ArrayD, ArrayViewD, Axis, Slice};
use smallvec::SmallVec;
use varcube_assemble::Snapshot;
use varcube_core::{CoordinateSystem, DeriveError, Layout, Real, SpatialAxis};

/// Half-width of the sixth-order stencil.
pub const STENCIL_RADIUS: usize = 3;

// ── Geometry ───────────────────────────────────────────────────────

/// Grid geometry a curl is evaluated on.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    /// Storage layout of the spatial axes.
    pub layout: Layout,
    /// Extent per axis (x, y, z), ghosts included.
    pub extent: [usize; 3],
    /// Ghost cells per side (x, y, z).
    pub ghost: [usize; 3],
    /// Inverse spacing per cell (x, y, z).
    pub inv_spacing: [Vec<f64>; 3],
    /// Coordinate system of the run.
    pub coord_system: CoordinateSystem,
}

fn slot(axis: SpatialAxis) -> usize {
    match axis {
        SpatialAxis::X => 0,
        SpatialAxis::Y => 1,
        SpatialAxis::Z => 2,
    }
}

impl Geometry {
    /// Geometry of an untrimmed snapshot.
    ///
    /// Per-cell inverse spacings come from the grid record when its
    /// extents match the snapshot; otherwise the snapshot's scalar
    /// spacings are assumed uniform.
    pub fn of<T: Real>(snap: &Snapshot<T>) -> Self {
        let meta = snap.metadata();
        let extent = [snap.x().len(), snap.y().len(), snap.z().len()];
        let (dx, dy, dz) = snap.spacing();
        let uniform = |h: T, n: usize| vec![1.0 / h.to_f64_lossless(); n];
        let inv_spacing = match snap.grid() {
            Some(g) if [g.dx_1.len(), g.dy_1.len(), g.dz_1.len()] == extent => {
                [g.dx_1.clone(), g.dy_1.clone(), g.dz_1.clone()]
            }
            _ => [
                uniform(dx, extent[0]),
                uniform(dy, extent[1]),
                uniform(dz, extent[2]),
            ],
        };
        Self {
            layout: snap.layout(),
            extent,
            ghost: [meta.dims.nghostx, meta.dims.nghosty, meta.dims.nghostz],
            inv_spacing,
            coord_system: meta.params.coord_system,
        }
    }

    /// Uniform Cartesian geometry with spacing `h` along every axis.
    pub fn uniform(layout: Layout, extent: [usize; 3], ghost: usize, h: f64) -> Self {
        Self {
            layout,
            extent,
            ghost: [ghost; 3],
            inv_spacing: extent.map(|n| vec![1.0 / h; n]),
            coord_system: CoordinateSystem::Cartesian,
        }
    }

    /// Spatial shape in storage order.
    pub fn spatial_shape(&self) -> SmallVec<[usize; 3]> {
        self.layout.axes().iter().map(|&a| self.extent[slot(a)]).collect()
    }

    fn interior(&self, axis: SpatialAxis) -> Range<usize> {
        let (m, g) = (self.extent[slot(axis)], self.ghost[slot(axis)]);
        g.min(m)..m.saturating_sub(g).max(g.min(m))
    }

    /// Storage index of `axis` within a spatial array, or `None` when
    /// derivatives along it vanish.
    fn active_axis(&self, axis: SpatialAxis) -> Option<usize> {
        let k = self.layout.axes().iter().position(|&a| a == axis)?;
        let active = self.interior(axis).len() > 1
            && self.extent[slot(axis)] > 2 * STENCIL_RADIUS
            && self.ghost[slot(axis)] >= STENCIL_RADIUS;
        active.then_some(k)
    }
}

// ── Trait ──────────────────────────────────────────────────────────

/// Vector-calculus primitives used by derived fields.
///
/// Inputs are three-component vectors of shape `[3, spatial...]` on an
/// untrimmed grid; outputs have the same shape.
pub trait CurlOperator<T: Real>: Send + Sync {
    /// `curl(v)`.
    fn curl(&self, v: ArrayViewD<'_, T>, geometry: &Geometry) -> Result<ArrayD<T>, DeriveError>;

    /// `curl(curl(v))`, evaluated from second derivatives.
    fn curl_curl(&self, v: ArrayViewD<'_, T>, geometry: &Geometry) -> Result<ArrayD<T>, DeriveError>;
}

// ── CentralCurl ────────────────────────────────────────────────────

/// Sixth-order central-difference curl on Cartesian grids.
#[derive(Clone, Copy, Debug, Default)]
pub struct CentralCurl;

fn check_input<T>(field: &'static str, v: &ArrayViewD<'_, T>, geometry: &Geometry) -> Result<(), DeriveError> {
    if geometry.coord_system != CoordinateSystem::Cartesian {
        return Err(DeriveError::UnsupportedCoordinates {
            field,
            system: geometry.coord_system,
        });
    }
    let spatial = geometry.spatial_shape();
    if v.ndim() != spatial.len() + 1 || v.shape()[0] != 3 || v.shape()[1..] != spatial[..] {
        return Err(DeriveError::ShapeMismatch {
            detail: format!(
                "{field} needs a [3, {:?}] vector, got {:?}",
                spatial.as_slice(),
                v.shape()
            ),
        });
    }
    Ok(())
}

impl CentralCurl {
    fn first<T: Real>(&self, f: &ArrayViewD<'_, T>, axis: SpatialAxis, geo: &Geometry) -> ArrayD<T> {
        let mut out = ArrayD::zeros(f.raw_dim());
        let Some(k) = geo.active_axis(axis) else {
            return out;
        };
        let inv = &geo.inv_spacing[slot(axis)];
        let c = |n: f64| T::from_f64_lossy(n);
        for i in geo.interior(axis) {
            let at = |o: isize| f.index_axis(Axis(k), i.wrapping_add_signed(o));
            let d = (&at(1) - &at(-1)) * c(45.0) - (&at(2) - &at(-2)) * c(9.0) + (&at(3) - &at(-3));
            out.index_axis_mut(Axis(k), i).assign(&(d * c(inv[i] / 60.0)));
        }
        out
    }

    fn second<T: Real>(&self, f: &ArrayViewD<'_, T>, axis: SpatialAxis, geo: &Geometry) -> ArrayD<T> {
        let mut out = ArrayD::zeros(f.raw_dim());
        let Some(k) = geo.active_axis(axis) else {
            return out;
        };
        let inv = &geo.inv_spacing[slot(axis)];
        let c = |n: f64| T::from_f64_lossy(n);
        for i in geo.interior(axis) {
            let at = |o: isize| f.index_axis(Axis(k), i.wrapping_add_signed(o));
            let d = at(0).mapv(|v| v * c(-490.0)) + (&at(1) + &at(-1)) * c(270.0)
                - (&at(2) + &at(-2)) * c(27.0)
                + (&at(3) + &at(-3)) * c(2.0);
            out.index_axis_mut(Axis(k), i)
                .assign(&(d * c(inv[i] * inv[i] / 180.0)));
        }
        out
    }

    fn mixed<T: Real>(
        &self,
        f: &ArrayViewD<'_, T>,
        a: SpatialAxis,
        b: SpatialAxis,
        geo: &Geometry,
    ) -> ArrayD<T> {
        let inner = self.first(f, a, geo);
        self.first(&inner.view(), b, geo)
    }

    /// Zero every cell outside the interior box.
    fn interior_only<T: Real>(&self, a: ArrayD<T>, geo: &Geometry) -> ArrayD<T> {
        let ranges: SmallVec<[Range<usize>; 3]> =
            geo.layout.axes().iter().map(|&ax| geo.interior(ax)).collect();
        let lead = a.ndim() - ranges.len();
        let select = |d: ndarray::AxisDescription| {
            let i = d.axis.index();
            if i < lead {
                Slice::from(..)
            } else {
                Slice::from(ranges[i - lead].clone())
            }
        };
        let mut out = ArrayD::zeros(a.raw_dim());
        out.slice_each_axis_mut(select).assign(&a.slice_each_axis(select));
        out
    }
}

fn stack3<T: Real>(c: [ArrayD<T>; 3]) -> Result<ArrayD<T>, DeriveError> {
    stack(Axis(0), &[c[0].view(), c[1].view(), c[2].view()]).map_err(|e| DeriveError::ShapeMismatch {
        detail: e.to_string(),
    })
}

impl<T: Real> CurlOperator<T> for CentralCurl {
    fn curl(&self, v: ArrayViewD<'_, T>, geo: &Geometry) -> Result<ArrayD<T>, DeriveError> {
        use SpatialAxis::{X, Y, Z};
        check_input("curl", &v, geo)?;
        let comp = |c: usize| v.index_axis(Axis(0), c);
        let d = |c: usize, axis| self.first(&comp(c), axis, geo);
        let out = stack3([d(2, Y) - d(1, Z), d(0, Z) - d(2, X), d(1, X) - d(0, Y)])?;
        Ok(self.interior_only(out, geo))
    }

    fn curl_curl(&self, v: ArrayViewD<'_, T>, geo: &Geometry) -> Result<ArrayD<T>, DeriveError> {
        use SpatialAxis::{X, Y, Z};
        check_input("curl curl", &v, geo)?;
        let comp = |c: usize| v.index_axis(Axis(0), c);
        let dd = |c: usize, axis| self.second(&comp(c), axis, geo);
        let dm = |c: usize, a, b| self.mixed(&comp(c), a, b, geo);
        // curl curl A = grad(div A) − ∇²A, with the pure second
        // derivatives of the matching component cancelling.
        let jx = dm(1, X, Y) + dm(2, X, Z) - dd(0, Y) - dd(0, Z);
        let jy = dm(0, X, Y) + dm(2, Y, Z) - dd(1, X) - dd(1, Z);
        let jz = dm(0, X, Z) + dm(1, Y, Z) - dd(2, X) - dd(2, Y);
        let out = stack3([jx, jy, jz])?;
        Ok(self.interior_only(out, geo))
    }
}
