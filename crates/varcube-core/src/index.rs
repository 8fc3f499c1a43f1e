//! The field-name index: symbolic names to 1-based variable slots.

use std::ops::Range;

use indexmap::IndexMap;

/// Names that appear in index files but never denote a variable slot.
const NON_SLOT_NAMES: [&str; 2] = ["global_gg", "keys"];

/// Prefixes of numbered test-field vector groups.
pub const TEST_GROUP_PREFIXES: [&str; 2] = ["aatest", "uutest"];

/// Mapping from field name to its 1-based slot in the snapshot tensor.
///
/// Insertion order is preserved so iteration follows the order of the
/// index file. Vector fields occupy three contiguous slots and are
/// addressed through their component names (`ux`, `uy`, `uz`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldIndex {
    slots: IndexMap<String, usize>,
}

/// A three-slot vector group resolved from the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorGroup {
    /// Name the group is exposed under (e.g. `uu`, `aatest1`).
    pub name: String,
    /// 0-based slot range into the variable axis.
    pub slots: Range<usize>,
}

impl FieldIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name` at 1-based `slot`.
    pub fn insert(&mut self, name: impl Into<String>, slot: usize) {
        self.slots.insert(name.into(), slot);
    }

    /// 1-based slot of `name`.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Whether the index names `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Number of names in the index.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate `(name, slot)` pairs in index-file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Names that get a single-slot view on a snapshot.
    ///
    /// Excludes bookkeeping entries and the components of numbered
    /// test-field groups, which are exposed as whole vectors instead.
    pub fn scalar_names(&self) -> impl Iterator<Item = (&str, usize)> {
        self.iter().filter(|(name, slot)| {
            *slot > 0
                && !NON_SLOT_NAMES.contains(name)
                && !TEST_GROUP_PREFIXES.iter().any(|p| name.contains(p))
        })
    }

    /// The three-slot group starting at component `first`, exposed as `name`.
    pub fn vector(&self, name: &str, first: &str) -> Option<VectorGroup> {
        let slot = self.slot(first)?;
        (slot > 0).then(|| VectorGroup {
            name: name.to_string(),
            slots: slot - 1..slot + 2,
        })
    }

    /// Vector groups with fixed names: velocity, vector potential, and the
    /// spherical-coordinate auxiliaries when present.
    pub fn named_vectors(&self) -> Vec<VectorGroup> {
        [("uu", "ux"), ("aa", "ax"), ("uu_sph", "uu_sphx"), ("bb_sph", "bb_sphx")]
            .iter()
            .filter_map(|(name, first)| self.vector(name, first))
            .collect()
    }

    /// Numbered test-field groups for `prefix` (`aatest` or `uutest`).
    ///
    /// The group count is the number of index entries mentioning the
    /// prefix divided by three. Groups are laid out contiguously from the
    /// slot of `<prefix>1` (or the lowest matching slot), and are named
    /// `<prefix>1`, `<prefix>2`, ... with the last group numbered `0`.
    pub fn test_groups(&self, prefix: &str) -> Vec<VectorGroup> {
        let matching: Vec<usize> = self
            .iter()
            .filter(|(name, slot)| name.contains(prefix) && *slot > 0)
            .map(|(_, slot)| slot)
            .collect();
        let count = matching.len() / 3;
        if count == 0 {
            return Vec::new();
        }
        let base = self
            .slot(&format!("{prefix}1"))
            .filter(|&s| s > 0)
            .or_else(|| matching.iter().copied().min())
            .unwrap_or(1);
        (0..count)
            .map(|j| {
                let first = base - 1 + 3 * j;
                VectorGroup {
                    name: format!("{prefix}{}", (j + 1) % count),
                    slots: first..first + 3,
                }
            })
            .collect()
    }
}

impl FromIterator<(String, usize)> for FieldIndex {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mhd_index() -> FieldIndex {
        [
            ("ux", 1),
            ("uy", 2),
            ("uz", 3),
            ("lnrho", 4),
            ("ss", 5),
            ("ax", 6),
            ("ay", 7),
            ("az", 8),
            ("global_gg", 0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn scalar_names_skip_bookkeeping() {
        let idx = mhd_index();
        let names: Vec<&str> = idx.scalar_names().map(|(n, _)| n).collect();
        assert_eq!(names, ["ux", "uy", "uz", "lnrho", "ss", "ax", "ay", "az"]);
    }

    #[test]
    fn named_vectors_resolve_contiguous_slots() {
        let groups = mhd_index().named_vectors();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "uu");
        assert_eq!(groups[0].slots, 0..3);
        assert_eq!(groups[1].name, "aa");
        assert_eq!(groups[1].slots, 5..8);
    }

    #[test]
    fn test_groups_wrap_last_number_to_zero() {
        let mut idx = mhd_index();
        for (i, c) in ["aatest1", "aatest1y", "aatest1z", "aatest2x", "aatest2y", "aatest2z"]
            .iter()
            .enumerate()
        {
            idx.insert(*c, 9 + i);
        }
        let groups = idx.test_groups("aatest");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "aatest1");
        assert_eq!(groups[0].slots, 8..11);
        assert_eq!(groups[1].name, "aatest0");
        assert_eq!(groups[1].slots, 11..14);
        assert!(idx.test_groups("uutest").is_empty());
    }

    #[test]
    fn test_group_components_are_not_scalar_views() {
        let mut idx = mhd_index();
        idx.insert("aatest1", 9);
        assert!(idx.scalar_names().all(|(n, _)| n != "aatest1"));
    }
}
