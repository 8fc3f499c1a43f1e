//! Run parameters: I/O strategy flags and equation-of-state constants.

use std::fmt;

/// Coordinate system the run was evolved in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CoordinateSystem {
    /// Cartesian `(x, y, z)`.
    #[default]
    Cartesian,
    /// Cylindrical `(r, phi, z)`.
    Cylindric,
    /// Spherical `(r, theta, phi)`.
    Spherical,
}

impl CoordinateSystem {
    /// Parse the coordinate-system name used in parameter files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cartesian" => Some(Self::Cartesian),
            "cylindric" | "cylindrical" => Some(Self::Cylindric),
            "spherical" => Some(Self::Spherical),
            _ => None,
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cartesian => write!(f, "cartesian"),
            Self::Cylindric => write!(f, "cylindric"),
            Self::Spherical => write!(f, "spherical"),
        }
    }
}

/// Equation-of-state constants for thermodynamic substitutions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EosConstants {
    /// Specific heat at constant pressure.
    pub cp: f64,
    /// Adiabatic index.
    pub gamma: f64,
    /// Reference sound speed.
    pub cs0: f64,
    /// Reference density.
    pub rho0: f64,
}

impl Default for EosConstants {
    fn default() -> Self {
        Self {
            cp: 1.0,
            gamma: 5.0 / 3.0,
            cs0: 1.0,
            rho0: 1.0,
        }
    }
}

impl EosConstants {
    /// Specific heat at constant volume, `cp / gamma`.
    pub fn cv(&self) -> f64 {
        self.cp / self.gamma
    }

    /// `ln(rho0)`.
    pub fn lnrho0(&self) -> f64 {
        self.rho0.ln()
    }

    /// `ln(cs0² / (cp (gamma - 1)))`.
    #[allow(non_snake_case)]
    pub fn lnTT0(&self) -> f64 {
        (self.cs0 * self.cs0 / (self.cp * (self.gamma - 1.0))).ln()
    }
}

/// Parameters of a run that affect how snapshots are read and interpreted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunParams {
    /// I/O strategy tag (`None` for runs that predate the tag).
    pub io_strategy: Option<String>,
    /// Whether the legacy binary writer used collective I/O.
    pub collective_io: bool,
    /// Whether auxiliary slots are written after the evolved ones.
    pub write_aux: bool,
    /// Whether snapshots store 2-D slices.
    pub write_2d: bool,
    /// Whether the run uses a shearing box (adds `deltay` to snapshots).
    pub shear: bool,
    /// Coordinate system.
    pub coord_system: CoordinateSystem,
    /// Equation-of-state constants.
    pub eos: EosConstants,
}
