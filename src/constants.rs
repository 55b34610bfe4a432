mod region_settings;
pub use region_settings::DEFAULT_REGION_EXTENSION;
pub use region_settings::DEFAULT_SECTOR_SIZE;
pub use region_settings::ENTRIES_PER_REGION;
pub use region_settings::REGION_ENTRY_WIDTH;
