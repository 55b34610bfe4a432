//! Shares a single [`RegionCache`] between tasks by giving it its own blocking
//! thread and talking to it over a queue.
//!
//! Every request is handled one after another by the executor, so opening a
//! region and recording it in the table can never interleave with another
//! caller, even for the same key.
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot::{self, error::RecvError};

use super::{
    NameCodec, RegionCache, RegionCacheError, RegionFactory, RegionHandle, RegionKey,
    ShutdownReport,
};

//Inner Types
mod region_executor;
use region_executor::RegionExecutor;
mod request_type;
use request_type::{RegionAccess, RequestType};

pub struct RegionManager<K, H> {
    request_queue: UnboundedSender<RequestType<K, H>>,
}

impl<K, H> RegionManager<K, H>
where
    K: RegionKey + Send + 'static,
    H: RegionHandle + Send + 'static,
{
    /// Takes ownership of `cache` and starts serving requests for it.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new<F, C>(cache: RegionCache<K, F, C>) -> RegionManager<K, H>
    where
        F: RegionFactory<K, Handle = H> + Send + 'static,
        C: NameCodec<K> + Send + 'static,
    {
        let (request_queue, receive_queue) = mpsc::unbounded_channel();

        let executor = RegionExecutor::new(cache, receive_queue);

        tokio::task::spawn_blocking(move || {
            executor.start();
        });

        RegionManager { request_queue }
    }

    pub async fn acquire(&self, key: K) -> Result<(), RegionManagerError> {
        let (res_request, res_receiver) = oneshot::channel();

        self.send(RequestType::Acquire((key, res_request)))?;

        Ok(res_receiver.await??)
    }

    /// Returns false, without creating anything, if the region is not on disk.
    pub async fn acquire_if_exists(&self, key: K) -> Result<bool, RegionManagerError> {
        let (res_request, res_receiver) = oneshot::channel();

        self.send(RequestType::AcquireIfExists((key, res_request)))?;

        Ok(res_receiver.await??)
    }

    /// Runs `access` against the open region for `key` and hands back its result.
    ///
    /// The region has to be acquired first. `access` runs on the executor's
    /// thread and holds up every other request while it does.
    pub async fn with_region<T, A>(&self, key: K, access: A) -> Result<T, RegionManagerError>
    where
        A: FnOnce(&mut H) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (res_value, value_receiver) = oneshot::channel();
        let (res_request, res_receiver) = oneshot::channel();

        let access: RegionAccess<H> = Box::new(move |region: &mut H| {
            let _ = res_value.send(access(region));
        });

        self.send(RequestType::Access((key, access, res_request)))?;

        res_receiver.await??;
        Ok(value_receiver.await?)
    }

    pub async fn release(&self, key: K) -> Result<(), RegionManagerError> {
        let (res_request, res_receiver) = oneshot::channel();

        self.send(RequestType::Release((key, res_request)))?;

        Ok(res_receiver.await??)
    }

    pub async fn all_keys(&self) -> Result<Vec<K>, RegionManagerError> {
        let (res_request, res_receiver) = oneshot::channel();

        self.send(RequestType::AllKeys(res_request))?;

        Ok(res_receiver.await??)
    }

    pub async fn open_count(&self) -> Result<usize, RegionManagerError> {
        let (res_request, res_receiver) = oneshot::channel();

        self.send(RequestType::OpenCount(res_request))?;

        Ok(res_receiver.await?)
    }

    /// Stops the executor once the requests already queued are served, then
    /// closes whatever is still open. Later calls on any clone fail with
    /// [`RegionManagerError::NotRunning`].
    pub async fn shutdown(&self) -> Result<ShutdownReport<K>, RegionManagerError> {
        let (res_shutdown, rev_shutdown) = oneshot::channel();

        self.send(RequestType::Shutdown(res_shutdown))?;

        rev_shutdown
            .await
            .map_err(|_| RegionManagerError::NotRunning())
    }

    fn send(&self, request: RequestType<K, H>) -> Result<(), RegionManagerError> {
        self.request_queue
            .send(request)
            .map_err(|_| RegionManagerError::NotRunning())
    }
}

impl<K, H> Clone for RegionManager<K, H> {
    fn clone(&self) -> Self {
        RegionManager {
            request_queue: self.request_queue.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegionManagerError {
    #[error("The region executor is not running.")]
    NotRunning(),
    #[error(transparent)]
    RecvError(#[from] RecvError),
    #[error(transparent)]
    RegionCacheError(#[from] RegionCacheError),
}
