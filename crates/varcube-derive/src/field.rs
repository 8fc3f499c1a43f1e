//! The closed set of derivable fields.

use std::fmt;
use std::str::FromStr;

/// A field computed from the primitive fields of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DerivedField {
    /// Magnetic field, `curl(aa)`.
    Bb,
    /// Magnetic field of every numbered `aatest` group, `bbtest<k>`.
    BbTest,
    /// Current density, `curl(curl(aa))`.
    Jj,
    /// Vorticity, `curl(uu)`.
    Vort,
    /// Density.
    Rho,
    /// Temperature.
    Tt,
    /// Specific entropy.
    Ss,
    /// Pressure.
    Pp,
}

/// How a derived field is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivationKind {
    /// Needs a curl operator and ghost cells.
    VectorCalculus,
    /// Pointwise algebra with equation-of-state constants.
    Thermodynamic,
}

impl DerivedField {
    /// Every derivable field.
    pub const ALL: [DerivedField; 8] = [
        Self::Bb,
        Self::BbTest,
        Self::Jj,
        Self::Vort,
        Self::Rho,
        Self::Tt,
        Self::Ss,
        Self::Pp,
    ];

    /// Tag the field is requested and stored under.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bb => "bb",
            Self::BbTest => "bbtest",
            Self::Jj => "jj",
            Self::Vort => "vort",
            Self::Rho => "rho",
            Self::Tt => "tt",
            Self::Ss => "ss",
            Self::Pp => "pp",
        }
    }

    /// Vector calculus or thermodynamics.
    pub fn kind(self) -> DerivationKind {
        match self {
            Self::Bb | Self::BbTest | Self::Jj | Self::Vort => DerivationKind::VectorCalculus,
            Self::Rho | Self::Tt | Self::Ss | Self::Pp => DerivationKind::Thermodynamic,
        }
    }

    /// Prerequisite groups. Each inner slice lists alternatives; one
    /// field from every group must be present.
    pub fn prerequisites(self) -> &'static [&'static [&'static str]] {
        match self {
            Self::Bb | Self::Jj => &[&["aa"]],
            Self::BbTest => &[&["aatest"]],
            Self::Vort => &[&["uu"]],
            Self::Rho => &[&["lnrho"]],
            Self::Tt => &[&["lnTT", "ss"]],
            Self::Ss => &[&["lnTT", "tt"], &["lnrho", "rho"]],
            Self::Pp => &[&["lnrho", "rho"], &["ss", "lnTT", "tt"]],
        }
    }
}

impl fmt::Display for DerivedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An unknown derived-field tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownFieldTag(pub String);

impl fmt::Display for UnknownFieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown derived field '{}'", self.0)
    }
}

impl std::error::Error for UnknownFieldTag {}

impl FromStr for DerivedField {
    type Err = UnknownFieldTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.tag() == s.trim())
            .ok_or_else(|| UnknownFieldTag(s.to_string()))
    }
}

/// Parse a list of tags, failing on the first unknown one.
pub fn parse_fields<'a>(tags: impl IntoIterator<Item = &'a str>) -> Result<Vec<DerivedField>, UnknownFieldTag> {
    tags.into_iter().map(str::parse).collect()
}
