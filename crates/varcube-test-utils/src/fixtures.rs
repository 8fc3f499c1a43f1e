//! Synthetic run directories.
//!
//! [`SyntheticRun`] writes every file a reader touches: `dim.dat`,
//! `index.pro`, `param.nml`, `time_series.dat`, optionally `grid.dat`,
//! and one snapshot per processor (or one collective snapshot). Field
//! values are a pure function of `(slot, global x, global y, global z)`
//! so assembled output can be compared against [`SyntheticRun::global_f`].

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use varcube_core::{
    CoordinateSystem, Dims, EosConstants, FieldIndex, Layout, Precision, RunMetadata, RunParams,
    SpatialAxis,
};

use crate::RecordWriter;

const SENTINEL: i32 = 2000;

/// A persistent payload to append to each snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum FixturePersist {
    Int(Vec<i32>),
    Real(Vec<f64>),
}

/// Value stored at `(slot, gx, gy, gz)`, global indices with ghosts.
pub type ValueFn = fn(usize, usize, usize, usize) -> f64;

/// Default value function: every digit group encodes one coordinate.
///
/// Exact in single precision for the small grids tests use.
pub fn positional_value(slot: usize, gx: usize, gy: usize, gz: usize) -> f64 {
    slot as f64 * 1e6 + gz as f64 * 1e4 + gy as f64 * 100.0 + gx as f64
}

/// Builder and writer for a synthetic run directory.
#[derive(Clone, Debug)]
pub struct SyntheticRun {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub nghost: usize,
    pub nprocx: usize,
    pub nprocy: usize,
    pub nprocz: usize,
    pub precision: Precision,
    pub evolved: Vec<String>,
    pub auxiliary: Vec<String>,
    pub write_aux: bool,
    pub write_2d: bool,
    pub collective: bool,
    pub deltay: Option<f64>,
    pub io_strategy: Option<String>,
    pub coord_system: CoordinateSystem,
    pub eos: EosConstants,
    pub persist: Vec<(i32, FixturePersist)>,
    pub t: f64,
    pub file_name: String,
    pub started: bool,
    pub write_grid: bool,
    pub spacing: [f64; 3],
    pub values: ValueFn,
}

impl SyntheticRun {
    /// A single-processor double-precision run with three ghost cells
    /// and no fields.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            nghost: 3,
            nprocx: 1,
            nprocy: 1,
            nprocz: 1,
            precision: Precision::Double,
            evolved: Vec::new(),
            auxiliary: Vec::new(),
            write_aux: false,
            write_2d: false,
            collective: false,
            deltay: None,
            io_strategy: Some("dist".to_string()),
            coord_system: CoordinateSystem::Cartesian,
            eos: EosConstants::default(),
            persist: Vec::new(),
            t: 0.0,
            file_name: "var.dat".to_string(),
            started: true,
            write_grid: false,
            spacing: [0.1, 0.2, 0.3],
            values: positional_value,
        }
    }

    // ── Builder ─────────────────────────────────────────────────

    pub fn procs(mut self, x: usize, y: usize, z: usize) -> Self {
        assert!(self.nx % x == 0 && self.ny % y == 0 && self.nz % z == 0);
        self.nprocx = x;
        self.nprocy = y;
        self.nprocz = z;
        self
    }

    pub fn nghost(mut self, g: usize) -> Self {
        self.nghost = g;
        self
    }

    pub fn precision(mut self, p: Precision) -> Self {
        self.precision = p;
        self
    }

    pub fn scalar(mut self, name: &str) -> Self {
        self.evolved.push(name.to_string());
        self
    }

    pub fn vector(mut self, components: [&str; 3]) -> Self {
        self.evolved.extend(components.iter().map(|c| c.to_string()));
        self
    }

    /// `groups` numbered test-field groups, three slots each.
    pub fn test_group(mut self, prefix: &str, groups: usize) -> Self {
        self.evolved
            .extend((1..=3 * groups).map(|i| format!("{prefix}{i}")));
        self
    }

    pub fn aux_scalar(mut self, name: &str) -> Self {
        self.auxiliary.push(name.to_string());
        self
    }

    pub fn write_aux(mut self, on: bool) -> Self {
        self.write_aux = on;
        self
    }

    pub fn write_2d(mut self) -> Self {
        self.write_2d = true;
        self
    }

    pub fn collective(mut self) -> Self {
        self.collective = true;
        self
    }

    pub fn shear(mut self, deltay: f64) -> Self {
        self.deltay = Some(deltay);
        self
    }

    pub fn io_strategy(mut self, tag: Option<&str>) -> Self {
        self.io_strategy = tag.map(str::to_string);
        self
    }

    pub fn coord_system(mut self, system: CoordinateSystem) -> Self {
        self.coord_system = system;
        self
    }

    pub fn eos(mut self, eos: EosConstants) -> Self {
        self.eos = eos;
        self
    }

    pub fn persist(mut self, id: i32, value: FixturePersist) -> Self {
        self.persist.push((id, value));
        self
    }

    pub fn time(mut self, t: f64) -> Self {
        self.t = t;
        self
    }

    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn started(mut self, on: bool) -> Self {
        self.started = on;
        self
    }

    pub fn with_grid(mut self) -> Self {
        self.write_grid = true;
        self
    }

    pub fn spacing(mut self, dx: f64, dy: f64, dz: f64) -> Self {
        self.spacing = [dx, dy, dz];
        self
    }

    pub fn values(mut self, f: ValueFn) -> Self {
        self.values = f;
        self
    }

    // ── Derived metadata ────────────────────────────────────────

    fn dims_with(&self, n: [usize; 3], ip: [usize; 3]) -> Dims {
        let g = self.nghost;
        Dims {
            mx: n[0] + 2 * g,
            my: n[1] + 2 * g,
            mz: n[2] + 2 * g,
            mvar: self.evolved.len(),
            maux: self.auxiliary.len(),
            nghostx: g,
            nghosty: g,
            nghostz: g,
            precision: self.precision,
            nprocx: self.nprocx,
            nprocy: self.nprocy,
            nprocz: self.nprocz,
            ipx: ip[0],
            ipy: ip[1],
            ipz: ip[2],
        }
    }

    pub fn global_dims(&self) -> Dims {
        self.dims_with([self.nx, self.ny, self.nz], [0, 0, 0])
    }

    pub fn local_n(&self) -> [usize; 3] {
        [
            self.nx / self.nprocx,
            self.ny / self.nprocy,
            self.nz / self.nprocz,
        ]
    }

    pub fn proc_dims(&self, ipx: usize, ipy: usize, ipz: usize) -> Dims {
        self.dims_with(self.local_n(), [ipx, ipy, ipz])
    }

    /// Processor number for processor coordinates, x fastest.
    pub fn proc_number(&self, ipx: usize, ipy: usize, ipz: usize) -> usize {
        ipx + self.nprocx * (ipy + self.nprocy * ipz)
    }

    pub fn layout(&self) -> Layout {
        Layout::for_run(self.write_2d, &self.global_dims())
    }

    pub fn total_vars(&self) -> usize {
        self.global_dims().total_vars(self.write_aux)
    }

    pub fn index(&self) -> FieldIndex {
        self.evolved
            .iter()
            .chain(&self.auxiliary)
            .enumerate()
            .map(|(i, name)| (name.clone(), i + 1))
            .collect()
    }

    pub fn params(&self) -> RunParams {
        RunParams {
            io_strategy: self.io_strategy.clone(),
            collective_io: self.collective,
            write_aux: self.write_aux,
            write_2d: self.write_2d,
            shear: self.deltay.is_some(),
            coord_system: self.coord_system,
            eos: self.eos,
        }
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata {
            dims: self.global_dims(),
            params: self.params(),
            index: self.index(),
        }
    }

    /// Global coordinates along x, y, z, ghosts included.
    pub fn global_coords(&self) -> [Vec<f64>; 3] {
        let d = self.global_dims();
        let g = self.nghost as f64;
        let axis = |m: usize, h: f64| (0..m).map(|i| (i as f64 - g + 0.5) * h).collect();
        [
            axis(d.mx, self.spacing[0]),
            axis(d.my, self.spacing[1]),
            axis(d.mz, self.spacing[2]),
        ]
    }

    /// The tensor a perfect assembly produces, ghosts included.
    pub fn global_f(&self) -> ArrayD<f64> {
        self.tensor(&self.global_dims(), [0, 0, 0])
    }

    fn tensor(&self, dims: &Dims, offset: [usize; 3]) -> ArrayD<f64> {
        let layout = self.layout();
        let axes = layout.axes();
        let g = self.nghost;
        let f = self.values;
        ArrayD::from_shape_fn(IxDyn(&layout.shape(self.total_vars(), dims)), |idx| {
            let mut pos = [g, g, g];
            for (k, axis) in axes.iter().enumerate() {
                let i = axis_slot(*axis);
                pos[i] = offset[i] + idx[k + 1];
            }
            f(idx[0], pos[0], pos[1], pos[2])
        })
    }

    // ── Writers ─────────────────────────────────────────────────

    /// Lay out the whole run under `datadir`.
    pub fn write(&self, datadir: &Path) -> io::Result<()> {
        fs::create_dir_all(datadir)?;
        fs::write(
            datadir.join("dim.dat"),
            dim_file(&self.global_dims(), [self.nprocx, self.nprocy, self.nprocz]),
        )?;
        fs::write(datadir.join("index.pro"), self.index_file())?;
        fs::write(datadir.join("param.nml"), self.param_file())?;
        if self.started {
            fs::write(datadir.join("time_series.dat"), "#--it-----t-----\n")?;
        }
        if self.write_grid {
            self.write_grid_file(&datadir.join("grid.dat"))?;
        }

        if self.collective {
            let dir = datadir.join("allprocs");
            fs::create_dir_all(&dir)?;
            return self.write_snapshot(&dir.join(&self.file_name), &self.global_dims(), [0, 0, 0]);
        }

        fs::write(datadir.join("proc_bounds.dat"), [0u8; 16])?;
        let n = self.local_n();
        for ipz in 0..self.nprocz {
            for ipy in 0..self.nprocy {
                for ipx in 0..self.nprocx {
                    let dir = datadir.join(format!("proc{}", self.proc_number(ipx, ipy, ipz)));
                    fs::create_dir_all(&dir)?;
                    let dims = self.proc_dims(ipx, ipy, ipz);
                    fs::write(dir.join("dim.dat"), dim_file(&dims, [ipx, ipy, ipz]))?;
                    let offset = [ipx * n[0], ipy * n[1], ipz * n[2]];
                    self.write_snapshot(&dir.join(&self.file_name), &dims, offset)?;
                }
            }
        }
        Ok(())
    }

    /// Write one snapshot for a block with `dims` starting at global
    /// index `offset`.
    pub fn write_snapshot(&self, path: &Path, dims: &Dims, offset: [usize; 3]) -> io::Result<()> {
        let mut w = RecordWriter::new(BufWriter::new(fs::File::create(path)?));
        let data: Vec<f64> = self.tensor(dims, offset).iter().copied().collect();
        w.write_reals(&data, self.precision)?;

        let [x, y, z] = self.global_coords();
        let mut coords = vec![self.t];
        coords.extend_from_slice(&x[offset[0]..offset[0] + dims.mx]);
        coords.extend_from_slice(&y[offset[1]..offset[1] + dims.my]);
        coords.extend_from_slice(&z[offset[2]..offset[2] + dims.mz]);
        coords.extend_from_slice(&self.spacing);
        if let Some(dy) = self.deltay {
            coords.push(dy);
        }
        w.write_reals(&coords, self.precision)?;

        if !self.persist.is_empty() {
            w.write_id(SENTINEL)?;
            for (id, value) in &self.persist {
                w.write_id(*id)?;
                match value {
                    FixturePersist::Int(v) => w.write_ints(v)?,
                    FixturePersist::Real(v) => w.write_reals(v, self.precision)?,
                }
            }
            w.write_id(SENTINEL)?;
        }
        w.into_inner().flush()
    }

    fn write_grid_file(&self, path: &Path) -> io::Result<()> {
        let mut w = RecordWriter::new(BufWriter::new(fs::File::create(path)?));
        let [x, y, z] = self.global_coords();
        let mut first = vec![self.t];
        first.extend(x.iter().chain(&y).chain(&z));
        first.extend_from_slice(&self.spacing);
        w.write_reals(&first, self.precision)?;
        let [dx, dy, dz] = self.spacing;
        w.write_reals(
            &[self.nx as f64 * dx, self.ny as f64 * dy, self.nz as f64 * dz],
            self.precision,
        )?;
        w.write_reals(&[x[self.nghost], y[self.nghost], z[self.nghost]], self.precision)?;
        let mut inverse = vec![1.0 / dx; x.len()];
        inverse.extend(std::iter::repeat_n(1.0 / dy, y.len()));
        inverse.extend(std::iter::repeat_n(1.0 / dz, z.len()));
        w.write_reals(&inverse, self.precision)?;
        w.into_inner().flush()
    }

    fn index_file(&self) -> String {
        let mut out = String::new();
        for (name, slot) in self.index().iter() {
            out.push_str(&format!("i{name}={slot}\n"));
        }
        out
    }

    fn param_file(&self) -> String {
        let flag = |b: bool| if b { "T" } else { "F" };
        let mut out = String::from("&INIT_PARS\n");
        out.push_str(&format!(" COORD_SYSTEM='{}',\n", self.coord_system));
        out.push_str(&format!(" LSHEAR={},\n", flag(self.deltay.is_some())));
        out.push_str(&format!(" LWRITE_AUX={},\n", flag(self.write_aux)));
        out.push_str(&format!(" LWRITE_2D={},\n", flag(self.write_2d)));
        if let Some(tag) = &self.io_strategy {
            out.push_str(&format!(" IO_STRATEGY=\"{tag}\",\n"));
        }
        out.push_str(&format!(" LCOLLECTIVE_IO={},\n", flag(self.collective)));
        out.push_str("/\n&EOS_INIT_PARS\n");
        out.push_str(&format!(" CP={:?},\n", self.eos.cp));
        out.push_str(&format!(" GAMMA={:?},\n", self.eos.gamma));
        out.push_str(&format!(" CS0={:?},\n", self.eos.cs0));
        out.push_str(&format!(" RHO0={:?},\n", self.eos.rho0));
        out.push_str("/\n");
        out
    }
}

fn axis_slot(axis: SpatialAxis) -> usize {
    match axis {
        SpatialAxis::X => 0,
        SpatialAxis::Y => 1,
        SpatialAxis::Z => 2,
    }
}

/// Render a dimension file; the last line is processor counts for the
/// global file and processor coordinates for a per-processor file.
pub fn dim_file(d: &Dims, last: [usize; 3]) -> String {
    let tag = match d.precision {
        Precision::Single => "S",
        Precision::Double => "D",
    };
    format!(
        "{} {} {} {} {} 0\n{tag}\n{} {} {}\n{} {} {}\n",
        d.mx,
        d.my,
        d.mz,
        d.mvar,
        d.maux,
        d.nghostx,
        d.nghosty,
        d.nghostz,
        last[0],
        last[1],
        last[2]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_blocks_overlap_global_by_ghosts() {
        let run = SyntheticRun::new(4, 2, 2).scalar("lnrho").procs(2, 1, 1);
        let d = run.proc_dims(1, 0, 0);
        assert_eq!(d.mx, 2 + 6);
        assert_eq!(run.proc_number(1, 0, 0), 1);
        let global = run.global_f();
        let local = run.tensor(&d, [2, 0, 0]);
        // Local x index 3 is the first interior cell of processor 1.
        assert_eq!(local[[0, 3, 3, 3]], global[[0, 3, 3, 5]]);
    }

    #[test]
    fn index_lists_evolved_then_auxiliary() {
        let run = SyntheticRun::new(2, 2, 2)
            .vector(["ux", "uy", "uz"])
            .aux_scalar("ss");
        let index = run.index();
        assert_eq!(index.slot("uz"), Some(3));
        assert_eq!(index.slot("ss"), Some(4));
        assert_eq!(run.total_vars(), 3);
        assert_eq!(run.clone().write_aux(true).total_vars(), 4);
    }
}
