//! Contracts between the cache and whatever actually opens regions.

use std::io;
use std::path::Path;

/// An open region. Closing consumes the handle so it can only happen once.
pub trait RegionHandle {
    /// Flush and release the underlying storage.
    fn close(self) -> io::Result<()>;
}

/// Builds handles for the cache.
///
/// Creation is create-or-open: a missing region is created, an existing one
/// is opened. The cache never calls `create` twice for the same key without
/// closing the first handle in between.
pub trait RegionFactory<K> {
    type Handle: RegionHandle;

    fn create(&self, path: &Path, key: &K) -> io::Result<Self::Handle>;
}

impl<K, H, F> RegionFactory<K> for F
where
    F: Fn(&Path, &K) -> io::Result<H>,
    H: RegionHandle,
{
    type Handle = H;

    fn create(&self, path: &Path, key: &K) -> io::Result<H> {
        self(path, key)
    }
}
