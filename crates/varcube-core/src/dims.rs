//! Grid dimensions, storage precision, and snapshot tensor layouts.

use std::fmt;
use std::ops::Range;

use smallvec::{smallvec, SmallVec};

/// Floating-point precision a run stored its snapshots in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 4-byte IEEE-754 floats (`S` in dimension files).
    Single,
    /// 8-byte IEEE-754 floats (`D` in dimension files).
    Double,
}

impl Precision {
    /// Size of one stored element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }

    /// Parse the one-letter precision tag used in dimension files.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "S" | "s" => Some(Self::Single),
            "D" | "d" => Some(Self::Double),
            _ => None,
        }
    }
}

/// One of the three spatial axes of the simulation grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpatialAxis {
    /// Fastest-varying axis in storage.
    X,
    /// Middle axis.
    Y,
    /// Slowest-varying spatial axis.
    Z,
}

impl SpatialAxis {
    /// All axes in x, y, z order.
    pub const ALL: [SpatialAxis; 3] = [Self::X, Self::Y, Self::Z];
}

impl fmt::Display for SpatialAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Z => write!(f, "z"),
        }
    }
}

/// Dimensions of a grid, either the global run or one subdomain.
///
/// Extents (`mx`, `my`, `mz`) include ghost cells on both sides, so the
/// interior extent along x is `mx - 2 * nghostx`. For a subdomain the
/// processor coordinates (`ipx`, `ipy`, `ipz`) locate it in the processor
/// grid; for the global run they are zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    /// Extent along x including ghosts.
    pub mx: usize,
    /// Extent along y including ghosts.
    pub my: usize,
    /// Extent along z including ghosts.
    pub mz: usize,
    /// Number of evolved variable slots.
    pub mvar: usize,
    /// Number of auxiliary variable slots.
    pub maux: usize,
    /// Ghost cells on each side along x.
    pub nghostx: usize,
    /// Ghost cells on each side along y.
    pub nghosty: usize,
    /// Ghost cells on each side along z.
    pub nghostz: usize,
    /// Precision the snapshot data was written in.
    pub precision: Precision,
    /// Processors along x.
    pub nprocx: usize,
    /// Processors along y.
    pub nprocy: usize,
    /// Processors along z.
    pub nprocz: usize,
    /// Processor coordinate along x (zero for global dimensions).
    pub ipx: usize,
    /// Processor coordinate along y.
    pub ipy: usize,
    /// Processor coordinate along z.
    pub ipz: usize,
}

impl Dims {
    /// Extent along `axis`, ghosts included.
    pub fn extent(&self, axis: SpatialAxis) -> usize {
        match axis {
            SpatialAxis::X => self.mx,
            SpatialAxis::Y => self.my,
            SpatialAxis::Z => self.mz,
        }
    }

    /// Ghost cells on each side along `axis`.
    pub fn ghost(&self, axis: SpatialAxis) -> usize {
        match axis {
            SpatialAxis::X => self.nghostx,
            SpatialAxis::Y => self.nghosty,
            SpatialAxis::Z => self.nghostz,
        }
    }

    /// Interior extent along `axis` (extent minus both ghost margins).
    pub fn interior(&self, axis: SpatialAxis) -> usize {
        self.extent(axis).saturating_sub(2 * self.ghost(axis))
    }

    /// Processor coordinate along `axis`.
    pub fn proc_coord(&self, axis: SpatialAxis) -> usize {
        match axis {
            SpatialAxis::X => self.ipx,
            SpatialAxis::Y => self.ipy,
            SpatialAxis::Z => self.ipz,
        }
    }

    /// Number of processors along `axis`.
    pub fn nproc(&self, axis: SpatialAxis) -> usize {
        match axis {
            SpatialAxis::X => self.nprocx,
            SpatialAxis::Y => self.nprocy,
            SpatialAxis::Z => self.nprocz,
        }
    }

    /// Interior index range along `axis` as a half-open range.
    ///
    /// This is `[l1, l2 + 1)` in inclusive-bound notation.
    pub fn interior_range(&self, axis: SpatialAxis) -> Range<usize> {
        let g = self.ghost(axis);
        let m = self.extent(axis);
        g.min(m)..m.saturating_sub(g).max(g.min(m))
    }

    /// Number of variable slots present in a snapshot.
    pub fn total_vars(&self, with_aux: bool) -> usize {
        if with_aux {
            self.mvar + self.maux
        } else {
            self.mvar
        }
    }

    /// Total processor count.
    pub fn nprocs(&self) -> usize {
        self.nprocx * self.nprocy * self.nprocz
    }
}

/// Storage layout of a snapshot tensor.
///
/// Full runs store `variables × z × y × x`. Runs that write 2-D slices
/// drop the degenerate axis: `variables × z × x` when the y-extent has a
/// single interior cell, `variables × y × x` otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `variables × z × y × x`.
    Full,
    /// `variables × z × x`.
    ReducedXz,
    /// `variables × y × x`.
    ReducedXy,
}

impl Layout {
    /// Pick the layout for a run from its 2-D output flag and global dims.
    pub fn for_run(write_2d: bool, dims: &Dims) -> Self {
        if !write_2d {
            Self::Full
        } else if dims.interior(SpatialAxis::Y) == 1 {
            Self::ReducedXz
        } else {
            Self::ReducedXy
        }
    }

    /// Spatial axes in storage order, slowest first.
    pub fn axes(self) -> SmallVec<[SpatialAxis; 3]> {
        match self {
            Self::Full => smallvec![SpatialAxis::Z, SpatialAxis::Y, SpatialAxis::X],
            Self::ReducedXz => smallvec![SpatialAxis::Z, SpatialAxis::X],
            Self::ReducedXy => smallvec![SpatialAxis::Y, SpatialAxis::X],
        }
    }

    /// Spatial shape for `dims`, in storage order.
    pub fn spatial_shape(self, dims: &Dims) -> SmallVec<[usize; 3]> {
        self.axes().iter().map(|&a| dims.extent(a)).collect()
    }

    /// Full tensor shape `[vars, spatial...]`.
    pub fn shape(self, vars: usize, dims: &Dims) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        shape.push(vars);
        shape.extend(self.spatial_shape(dims));
        shape
    }

    /// Number of grid cells in one variable slot.
    pub fn cells(self, dims: &Dims) -> usize {
        self.spatial_shape(dims).iter().product()
    }

    /// The axis dropped by this layout, if any.
    pub fn dropped_axis(self) -> Option<SpatialAxis> {
        match self {
            Self::Full => None,
            Self::ReducedXz => Some(SpatialAxis::Y),
            Self::ReducedXy => Some(SpatialAxis::Z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dims(mx: usize, my: usize, mz: usize, g: usize) -> Dims {
        Dims {
            mx,
            my,
            mz,
            mvar: 4,
            maux: 2,
            nghostx: g,
            nghosty: g,
            nghostz: g,
            precision: Precision::Double,
            nprocx: 1,
            nprocy: 1,
            nprocz: 1,
            ipx: 0,
            ipy: 0,
            ipz: 0,
        }
    }

    #[test]
    fn interior_range_strips_ghosts() {
        let d = dims(14, 10, 7, 3);
        assert_eq!(d.interior_range(SpatialAxis::X), 3..11);
        assert_eq!(d.interior_range(SpatialAxis::Y), 3..7);
        assert_eq!(d.interior_range(SpatialAxis::Z), 3..4);
        assert_eq!(d.interior(SpatialAxis::Z), 1);
    }

    #[test]
    fn total_vars_counts_aux_only_when_asked() {
        let d = dims(7, 7, 7, 3);
        assert_eq!(d.total_vars(false), 4);
        assert_eq!(d.total_vars(true), 6);
    }

    #[test]
    fn layout_selection_follows_degenerate_axis() {
        assert_eq!(Layout::for_run(false, &dims(10, 7, 10, 3)), Layout::Full);
        assert_eq!(Layout::for_run(true, &dims(10, 7, 10, 3)), Layout::ReducedXz);
        assert_eq!(Layout::for_run(true, &dims(10, 10, 7, 3)), Layout::ReducedXy);
    }

    #[test]
    fn layout_shapes() {
        let d = dims(10, 8, 6, 2);
        assert_eq!(Layout::Full.shape(3, &d), vec![3, 6, 8, 10]);
        assert_eq!(Layout::ReducedXz.shape(3, &d), vec![3, 6, 10]);
        assert_eq!(Layout::ReducedXy.shape(3, &d), vec![3, 8, 10]);
        assert_eq!(Layout::Full.cells(&d), 480);
    }

    #[test]
    fn precision_tags() {
        assert_eq!(Precision::from_tag(" D "), Some(Precision::Double));
        assert_eq!(Precision::from_tag("S"), Some(Precision::Single));
        assert_eq!(Precision::from_tag("Q"), None);
        assert_eq!(Precision::Single.bytes(), 4);
    }

    proptest! {
        #[test]
        fn interior_range_is_within_extent(m in 0usize..64, g in 0usize..8) {
            let d = dims(m, m, m, g);
            let r = d.interior_range(SpatialAxis::X);
            prop_assert!(r.start <= r.end);
            prop_assert!(r.end <= m);
            prop_assert_eq!(r.len(), d.interior(SpatialAxis::X));
        }
    }
}
