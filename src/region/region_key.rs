//! Keys that identify a single region on disk.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use crate::constants::ENTRIES_PER_REGION;

/// A key naming exactly one region. It is used as the key of the open handle
/// table so equality and hashing must not change while a handle is open.
pub trait RegionKey: Clone + Debug + Eq + Hash {
    /// How many entries a region with this key holds.
    fn entries_per_region(&self) -> usize;
}

/// Position of a square 2D region, measured in regions not entries.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> RegionPos {
        RegionPos { x, z }
    }
}

impl RegionKey for RegionPos {
    fn entries_per_region(&self) -> usize {
        ENTRIES_PER_REGION
    }
}

impl Display for RegionPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({0}, {1})", self.x, self.z)
    }
}
