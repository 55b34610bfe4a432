//! Defaults used when building region files and naming them on disk.

/// Size of a sector in bytes. Every read and write of a region file happens in
/// whole sectors.
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// Regions are square, this many entries along each axis.
pub const REGION_ENTRY_WIDTH: usize = 32;

/// Number of entries a 2D region holds.
pub const ENTRIES_PER_REGION: usize = REGION_ENTRY_WIDTH * REGION_ENTRY_WIDTH;

/// File extension appended to every region file name.
pub const DEFAULT_REGION_EXTENSION: &str = "2dr";
