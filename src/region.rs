/*

    Addressing:
        RegionKey -> NameCodec -> <root>/<name>

    Lifecycle:
        acquire / acquire_if_exists  -> handle tracked
        release                      -> handle closed
        shutdown                     -> everything left is closed and reported

    The RegionCache is the only owner of an open handle. Callers borrow it
    and hand it back by key.

    Locking stays out of the cache, it takes &mut self for everything.
    The RegionManager runs a cache on its own blocking task for callers
    that need to share it.
*/

mod name_codec;
pub use name_codec::NameCodec;
pub use name_codec::NameCodecError;
pub use name_codec::RegionPosCodec;

mod region_cache;
pub use region_cache::AllKeys;
pub use region_cache::RegionCache;
pub use region_cache::RegionCacheBuilder;
pub use region_cache::RegionCacheError;

mod region_file;
pub use region_file::RegionFile;
pub use region_file::RegionFileBuilder;
pub use region_file::RegionFileError;
pub use region_file::RegionFileFactory;

mod region_handle;
pub use region_handle::RegionFactory;
pub use region_handle::RegionHandle;

mod region_key;
pub use region_key::RegionKey;
pub use region_key::RegionPos;

mod region_manager;
pub use region_manager::RegionManager;
pub use region_manager::RegionManagerError;

mod shutdown_report;
pub use shutdown_report::ShutdownReport;
