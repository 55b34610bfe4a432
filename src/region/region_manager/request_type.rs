use tokio::sync::oneshot::Sender;

use crate::region::{RegionCacheError, ShutdownReport};

/// Work to run against an open region on the executor's thread.
pub type RegionAccess<H> = Box<dyn FnOnce(&mut H) + Send>;

pub enum RequestType<K, H> {
    Access((K, RegionAccess<H>, Sender<Result<(), RegionCacheError>>)),
    Acquire((K, Sender<Result<(), RegionCacheError>>)),
    AcquireIfExists((K, Sender<Result<bool, RegionCacheError>>)),
    AllKeys(Sender<Result<Vec<K>, RegionCacheError>>),
    OpenCount(Sender<usize>),
    Release((K, Sender<Result<(), RegionCacheError>>)),
    Shutdown(Sender<ShutdownReport<K>>),
}
