//! Tracks which regions are open and owns their handles until they are given back.
//!
//! The cache is not synchronized. Every operation that touches the open table
//! takes `&mut self`, so callers sharing a cache have to serialize access
//! themselves, or use the [`RegionManager`](super::RegionManager) which does it
//! for them.
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, ReadDir};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::name_codec::{NameCodec, NameCodecError};
use super::region_file::RegionFileFactory;
use super::region_handle::{RegionFactory, RegionHandle};
use super::region_key::RegionKey;
use super::shutdown_report::ShutdownReport;
use crate::constants::DEFAULT_SECTOR_SIZE;

type Handle<K, F> = <F as RegionFactory<K>>::Handle;

pub struct RegionCache<K, F, C>
where
    K: RegionKey,
    F: RegionFactory<K>,
    C: NameCodec<K>,
{
    directory: PathBuf,
    factory: F,
    codec: C,
    regions: HashMap<K, Handle<K, F>>,
}

impl<K, F, C> RegionCache<K, F, C>
where
    K: RegionKey,
    F: RegionFactory<K>,
    C: NameCodec<K>,
{
    pub fn new(
        directory: impl Into<PathBuf>,
        factory: F,
        codec: C,
    ) -> Result<RegionCache<K, F, C>, RegionCacheError> {
        let directory = directory.into();

        if !directory.is_dir() {
            return Err(RegionCacheError::NeedDirectory(
                directory.to_string_lossy().to_string(),
            ));
        }

        Ok(RegionCache {
            directory,
            factory,
            codec,
            regions: HashMap::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where the region for `key` lives, whether or not it exists yet.
    pub fn region_path(&self, key: &K) -> PathBuf {
        self.directory.join(self.codec.encode(key))
    }

    pub fn is_open(&self, key: &K) -> bool {
        self.regions.contains_key(key)
    }

    pub fn open_count(&self) -> usize {
        self.regions.len()
    }

    /// Opens the region for `key`, creating it if needed, and tracks it until
    /// [`release`](Self::release) is called.
    ///
    /// If `key` is already open the prior handle is closed before a new one is
    /// built. Should that close fail the error is returned and `key` is left
    /// untracked.
    pub fn acquire(&mut self, key: &K) -> Result<&mut Handle<K, F>, RegionCacheError> {
        let path = self.region_path(key);
        self.open_region(key, path)
    }

    /// Same as [`acquire`](Self::acquire) but only if the region is already on
    /// disk. A missing region is not created and nothing is tracked.
    pub fn acquire_if_exists(
        &mut self,
        key: &K,
    ) -> Result<Option<&mut Handle<K, F>>, RegionCacheError> {
        let path = self.region_path(key);
        if !path.try_exists()? {
            return Ok(None);
        }

        self.open_region(key, path).map(Some)
    }

    /// Borrows a region that is already open without opening anything.
    pub fn region_mut(&mut self, key: &K) -> Option<&mut Handle<K, F>> {
        self.regions.get_mut(key)
    }

    /// Stops tracking `key` and closes its handle.
    pub fn release(&mut self, key: &K) -> Result<(), RegionCacheError> {
        let handle = self
            .regions
            .remove(key)
            .ok_or_else(|| RegionCacheError::NotTracked(format!("{:?}", key)))?;

        handle
            .close()
            .map_err(|e| RegionCacheError::CloseFailure(format!("{:?}", key), e))?;

        debug!("Released region {:?}", key);
        Ok(())
    }

    /// Lists the key of every region in the directory, open or not.
    ///
    /// The listing is taken when this is called and the iterator stops at the
    /// first entry whose name cannot be decoded.
    pub fn all_keys(&self) -> Result<AllKeys<'_, K, C>, RegionCacheError> {
        let entries = fs::read_dir(&self.directory)?;

        Ok(AllKeys {
            entries,
            codec: &self.codec,
            failed: false,
            key_type: PhantomData,
        })
    }

    /// Closes everything still open. Handles left open at this point were
    /// leaked by their callers, so each is logged and reported.
    pub fn shutdown(mut self) -> ShutdownReport<K> {
        let report = self.close_all();
        debug!("Region cache at {} shut down", self.directory.display());
        report
    }

    fn open_region(
        &mut self,
        key: &K,
        path: PathBuf,
    ) -> Result<&mut Handle<K, F>, RegionCacheError> {
        if let Some(prior) = self.regions.remove(key) {
            warn!(
                "Region {:?} acquired again without a release, closing the prior handle",
                key
            );
            prior
                .close()
                .map_err(|e| RegionCacheError::CloseFailure(format!("{:?}", key), e))?;
        }

        let handle = self
            .factory
            .create(&path, key)
            .map_err(|e| RegionCacheError::ConstructionFailure(format!("{:?}", key), e))?;
        debug!("Opened region {:?} at {}", key, path.display());

        Ok(self.regions.entry(key.clone()).or_insert(handle))
    }

    fn close_all(&mut self) -> ShutdownReport<K> {
        if self.regions.is_empty() {
            return ShutdownReport::default();
        }

        warn!("Leaked {} regions! Closing them now", self.regions.len());

        let closed = self
            .regions
            .drain()
            .map(|(key, handle)| {
                let res = handle.close();
                if let Err(e) = &res {
                    error!("Unable to close leaked region {:?}: {}", key, e);
                }
                (key, res)
            })
            .collect();

        ShutdownReport::new(closed)
    }
}

impl<K, F, C> Drop for RegionCache<K, F, C>
where
    K: RegionKey,
    F: RegionFactory<K>,
    C: NameCodec<K>,
{
    fn drop(&mut self) {
        if self.regions.is_empty() {
            return;
        }
        error!("Region cache wasn't shutdown cleanly!");
        self.close_all();
    }
}

/// Keys of the regions found in a directory listing, see [`RegionCache::all_keys`].
pub struct AllKeys<'a, K, C> {
    entries: ReadDir,
    codec: &'a C,
    failed: bool,
    key_type: PhantomData<fn() -> K>,
}

impl<'a, K, C> Iterator for AllKeys<'a, K, C>
where
    C: NameCodec<K>,
{
    type Item = Result<K, RegionCacheError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let result = match self.entries.next()? {
            Ok(entry) => {
                let name = entry.file_name();
                match name.to_str() {
                    Some(s) => self.codec.decode(s).map_err(RegionCacheError::from),
                    None => Err(RegionCacheError::InvalidName(name.clone())),
                }
            }
            Err(e) => Err(RegionCacheError::IOError(e)),
        };

        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Named settings for building a [`RegionCache`].
#[derive(Clone, Debug)]
pub struct RegionCacheBuilder {
    root: Option<PathBuf>,
    create_root: bool,
    sector_size: usize,
}

impl RegionCacheBuilder {
    pub fn new() -> RegionCacheBuilder {
        RegionCacheBuilder {
            root: None,
            create_root: false,
            sector_size: DEFAULT_SECTOR_SIZE,
        }
    }

    /// Directory every region file lives directly under.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Create the root directory, and its parents, if it is missing.
    pub fn create_root(mut self, create_root: bool) -> Self {
        self.create_root = create_root;
        self
    }

    /// Sector size handed to every region file the default factory opens.
    ///
    /// Only [`build_default`](Self::build_default) reads it, a factory passed to
    /// [`build`](Self::build) brings its own.
    pub fn sector_size(mut self, sector_size: usize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Builds a cache around `factory`. The sector size setting is not used.
    pub fn build<K, F, C>(
        self,
        factory: F,
        codec: C,
    ) -> Result<RegionCache<K, F, C>, RegionCacheError>
    where
        K: RegionKey,
        F: RegionFactory<K>,
        C: NameCodec<K>,
    {
        let root = self.root.ok_or(RegionCacheError::MissingRoot())?;

        if self.create_root {
            fs::create_dir_all(&root)?;
            info!("Created region directory {}", root.display());
        }

        RegionCache::new(root, factory, codec)
    }

    /// Builds a cache that opens every region as a [`RegionFile`](super::RegionFile).
    pub fn build_default<K, C>(
        self,
        codec: C,
    ) -> Result<RegionCache<K, RegionFileFactory, C>, RegionCacheError>
    where
        K: RegionKey,
        C: NameCodec<K>,
    {
        if !self.sector_size.is_power_of_two() {
            return Err(RegionCacheError::InvalidSectorSize(self.sector_size));
        }

        let factory = RegionFileFactory::new(self.sector_size);
        self.build(factory, codec)
    }
}

impl Default for RegionCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum RegionCacheError {
    #[error("Unable to close region {0}")]
    CloseFailure(String, #[source] std::io::Error),
    #[error("Unable to open region {0}")]
    ConstructionFailure(String, #[source] std::io::Error),
    #[error(transparent)]
    DecodeFailure(#[from] NameCodecError),
    #[error("Region directory entry {0:?} is not valid unicode")]
    InvalidName(OsString),
    #[error("Sector size must be a power of two, got {0}")]
    InvalidSectorSize(usize),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("No root directory was given for the regions")]
    MissingRoot(),
    #[error(
        "Need a directory to store the regions. Got ({0}) may be stripped of non Unicode chars."
    )]
    NeedDirectory(String),
    #[error("Region {0} is not open")]
    NotTracked(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    use super::*;
    use crate::region::{RegionPos, RegionPosCodec};

    #[derive(Debug)]
    struct TestRegion {
        id: usize,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl RegionHandle for TestRegion {
        fn close(self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct TestFactory {
        created: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_create: bool,
        fail_close: bool,
    }

    impl TestFactory {
        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl RegionFactory<RegionPos> for TestFactory {
        type Handle = TestRegion;

        fn create(&self, path: &Path, _key: &RegionPos) -> io::Result<TestRegion> {
            if self.fail_create {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "create failed",
                ));
            }

            OpenOptions::new().create(true).append(true).open(path)?;
            let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;

            Ok(TestRegion {
                id,
                closes: self.closes.clone(),
                fail_close: self.fail_close,
            })
        }
    }

    fn test_cache(
        dir: &Path,
        factory: TestFactory,
    ) -> Result<RegionCache<RegionPos, TestFactory, RegionPosCodec>, RegionCacheError> {
        RegionCache::new(dir, factory, RegionPosCodec::new("ext"))
    }

    #[test]
    fn test_release_untracked() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let mut cache = test_cache(tmp.path(), TestFactory::default())?;

        for x in -2..2 {
            assert!(matches!(
                cache.release(&RegionPos::new(x, x)),
                Err(RegionCacheError::NotTracked(_))
            ));
        }

        Ok(())
    }

    #[test]
    fn test_acquire_release() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;
        let key = RegionPos::new(3, -9);

        cache.acquire(&key)?;
        assert!(cache.is_open(&key));
        assert!(tmp.path().join("3.-9.ext").exists());

        cache.release(&key)?;
        assert!(!cache.is_open(&key));
        assert_eq!(cache.open_count(), 0);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.closes(), 1);

        assert!(cache.shutdown().is_clean());

        Ok(())
    }

    #[test]
    fn test_empty_directory() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;

        assert_eq!(cache.all_keys()?.count(), 0);

        for x in 0..4 {
            assert!(cache.acquire_if_exists(&RegionPos::new(x, 0))?.is_none());
        }
        assert_eq!(factory.created(), 0);
        assert_eq!(cache.open_count(), 0);
        assert_eq!(cache.all_keys()?.count(), 0);

        Ok(())
    }

    #[test]
    fn test_acquire_if_exists() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        File::create(tmp.path().join("0.0.ext"))?;

        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;
        let key = RegionPos::new(0, 0);

        let region = cache.acquire_if_exists(&key)?;
        assert!(region.is_some());
        assert_eq!(factory.created(), 1);

        cache.release(&key)?;
        assert!(matches!(
            cache.release(&key),
            Err(RegionCacheError::NotTracked(_))
        ));

        Ok(())
    }

    #[test]
    fn test_reacquire_closes_prior() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;
        let key = RegionPos::new(1, 1);

        assert_eq!(cache.acquire(&key)?.id, 1);
        assert_eq!(cache.acquire(&key)?.id, 2);

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.closes(), 1);
        assert_eq!(cache.open_count(), 1);
        assert_eq!(cache.region_mut(&key).map(|r| r.id), Some(2));

        cache.release(&key)?;
        assert_eq!(factory.closes(), 2);

        Ok(())
    }

    #[test]
    fn test_reacquire_close_failure() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory {
            fail_close: true,
            ..Default::default()
        };
        let mut cache = test_cache(tmp.path(), factory.clone())?;
        let key = RegionPos::new(1, 1);

        cache.acquire(&key)?;
        assert!(matches!(
            cache.acquire(&key),
            Err(RegionCacheError::CloseFailure(_, _))
        ));
        assert!(!cache.is_open(&key));
        assert_eq!(factory.created(), 1);

        Ok(())
    }

    #[test]
    fn test_construction_failure() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        File::create(tmp.path().join("2.2.ext"))?;

        let factory = TestFactory {
            fail_create: true,
            ..Default::default()
        };
        let mut cache = test_cache(tmp.path(), factory)?;

        match cache.acquire(&RegionPos::new(1, 1)) {
            Err(RegionCacheError::ConstructionFailure(_, e)) => {
                assert_eq!(e.kind(), io::ErrorKind::PermissionDenied)
            }
            other => panic!("Expected a construction failure, got {:?}", other),
        }
        assert!(matches!(
            cache.acquire_if_exists(&RegionPos::new(2, 2)),
            Err(RegionCacheError::ConstructionFailure(_, _))
        ));
        assert_eq!(cache.open_count(), 0);

        Ok(())
    }

    #[test]
    fn test_release_close_failure() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory {
            fail_close: true,
            ..Default::default()
        };
        let mut cache = test_cache(tmp.path(), factory.clone())?;
        let key = RegionPos::new(5, 5);

        cache.acquire(&key)?;
        assert!(matches!(
            cache.release(&key),
            Err(RegionCacheError::CloseFailure(_, _))
        ));
        assert!(!cache.is_open(&key));
        assert_eq!(factory.closes(), 1);

        Ok(())
    }

    #[test]
    fn test_shutdown_reports_leaks() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;

        let keys: Vec<RegionPos> = (0..5).map(|i| RegionPos::new(i, -i)).collect();
        for k in keys.iter() {
            cache.acquire(k)?;
        }
        cache.release(&keys[0])?;

        let report = cache.shutdown();
        assert_eq!(report.leaked_count(), 4);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(factory.closes(), 5);

        let leaked: HashSet<RegionPos> = report.iter().map(|(k, _)| *k).collect();
        let expected: HashSet<RegionPos> = keys[1..].iter().copied().collect();
        assert_eq!(leaked, expected);

        Ok(())
    }

    #[test]
    fn test_shutdown_continues_past_failures() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory {
            fail_close: true,
            ..Default::default()
        };
        let mut cache = test_cache(tmp.path(), factory.clone())?;

        for i in 0..3 {
            cache.acquire(&RegionPos::new(i, 0))?;
        }

        let report = cache.shutdown();
        assert_eq!(report.leaked_count(), 3);
        assert_eq!(report.failures().count(), 3);
        assert_eq!(factory.closes(), 3);

        Ok(())
    }

    #[test]
    fn test_drop_closes_leaks() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let factory = TestFactory::default();
        let mut cache = test_cache(tmp.path(), factory.clone())?;

        cache.acquire(&RegionPos::new(0, 1))?;
        cache.acquire(&RegionPos::new(1, 0))?;
        drop(cache);

        assert_eq!(factory.closes(), 2);

        Ok(())
    }

    #[test]
    fn test_all_keys_ignores_table() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let on_disk = vec![
            RegionPos::new(0, 0),
            RegionPos::new(-1, 4),
            RegionPos::new(30, -30),
        ];
        let codec = RegionPosCodec::new("ext");
        for k in on_disk.iter() {
            File::create(tmp.path().join(codec.encode(k)))?;
        }

        let mut cache = test_cache(tmp.path(), TestFactory::default())?;
        cache.acquire(&on_disk[1])?;
        let created = RegionPos::new(8, 8);
        cache.acquire(&created)?;
        cache.release(&created)?;

        let found: HashSet<RegionPos> = cache.all_keys()?.collect::<Result<_, _>>()?;
        let mut expected: HashSet<RegionPos> = on_disk.into_iter().collect();
        expected.insert(created);
        assert_eq!(found, expected);

        Ok(())
    }

    #[test]
    fn test_all_keys_stops_on_bad_name() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        File::create(tmp.path().join("0.0.ext"))?;
        File::create(tmp.path().join("notes.txt"))?;

        let cache = test_cache(tmp.path(), TestFactory::default())?;

        let mut keys = cache.all_keys()?;
        let mut saw_failure = false;
        for res in &mut keys {
            if let Err(e) = res {
                assert!(matches!(e, RegionCacheError::DecodeFailure(_)));
                saw_failure = true;
                break;
            }
        }
        assert!(saw_failure);
        assert!(keys.next().is_none());

        assert!(cache
            .all_keys()?
            .collect::<Result<Vec<RegionPos>, _>>()
            .is_err());

        Ok(())
    }

    #[test]
    fn test_closure_factory() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let closes = Arc::new(AtomicUsize::new(0));
        let factory_closes = closes.clone();

        let factory = move |_path: &Path, key: &RegionPos| -> io::Result<TestRegion> {
            Ok(TestRegion {
                id: usize::try_from(key.x).unwrap_or_default(),
                closes: factory_closes.clone(),
                fail_close: false,
            })
        };
        let mut cache: RegionCache<RegionPos, _, _> =
            RegionCache::new(tmp.path(), factory, RegionPosCodec::new("ext"))?;

        assert_eq!(cache.acquire(&RegionPos::new(6, 0))?.id, 6);
        cache.release(&RegionPos::new(6, 0))?;
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[test]
    fn test_need_directory() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let file_path = tmp.path().join("not_a_dir");
        File::create(&file_path)?;

        assert!(matches!(
            test_cache(&file_path, TestFactory::default()),
            Err(RegionCacheError::NeedDirectory(_))
        ));
        assert!(matches!(
            test_cache(&tmp.path().join("missing"), TestFactory::default()),
            Err(RegionCacheError::NeedDirectory(_))
        ));

        Ok(())
    }

    #[test]
    fn test_builder() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("world").join("regions");

        assert!(matches!(
            RegionCacheBuilder::new().build_default::<RegionPos, _>(RegionPosCodec::default()),
            Err(RegionCacheError::MissingRoot())
        ));
        assert!(matches!(
            RegionCacheBuilder::new()
                .root(&root)
                .build_default::<RegionPos, _>(RegionPosCodec::default()),
            Err(RegionCacheError::NeedDirectory(_))
        ));
        assert!(matches!(
            RegionCacheBuilder::new()
                .root(&root)
                .create_root(true)
                .sector_size(1000)
                .build_default::<RegionPos, _>(RegionPosCodec::default()),
            Err(RegionCacheError::InvalidSectorSize(1000))
        ));

        let mut cache = RegionCacheBuilder::new()
            .root(&root)
            .create_root(true)
            .sector_size(1024)
            .build_default::<RegionPos, _>(RegionPosCodec::default())?;
        assert!(root.is_dir());

        let region = cache.acquire(&RegionPos::new(0, -1))?;
        assert_eq!(region.sector_size(), 1024);
        assert_eq!(region.path(), root.join("0.-1.2dr").as_path());

        let report = cache.shutdown();
        assert_eq!(report.leaked_count(), 1);
        assert!(report.failures().next().is_none());

        //A caller supplied factory owns its own sector size
        let factory = TestFactory::default();
        let mut cache = RegionCacheBuilder::new()
            .root(&root)
            .sector_size(1000)
            .build(factory.clone(), RegionPosCodec::default())?;
        cache.acquire(&RegionPos::new(3, 3))?;
        assert_eq!(factory.created(), 1);
        assert!(cache.shutdown().failures().next().is_none());

        Ok(())
    }
}
