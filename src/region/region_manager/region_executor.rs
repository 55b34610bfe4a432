//! Inner type that owns the cache so the outer type only has to deal with the queue.
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot::Sender;

use super::request_type::RequestType;
use crate::region::{
    NameCodec, RegionCache, RegionCacheError, RegionFactory, RegionKey, ShutdownReport,
};

pub struct RegionExecutor<K, F, C>
where
    K: RegionKey,
    F: RegionFactory<K>,
    C: NameCodec<K>,
{
    cache: RegionCache<K, F, C>,
    receive_queue: UnboundedReceiver<RequestType<K, F::Handle>>,
}

impl<K, F, C> RegionExecutor<K, F, C>
where
    K: RegionKey,
    F: RegionFactory<K>,
    C: NameCodec<K>,
{
    pub fn new(
        cache: RegionCache<K, F, C>,
        receive_queue: UnboundedReceiver<RequestType<K, F::Handle>>,
    ) -> RegionExecutor<K, F, C> {
        RegionExecutor {
            cache,
            receive_queue,
        }
    }

    /// Blocks the calling thread until shutdown, run it on a blocking task.
    ///
    /// Requests are handled strictly one at a time, so the cache never sees two
    /// callers at once.
    pub fn start(self) {
        let RegionExecutor {
            mut cache,
            mut receive_queue,
        } = self;

        let mut shutdown_sender: Option<Sender<ShutdownReport<K>>> = None;

        while let Some(request) = receive_queue.blocking_recv() {
            match request {
                RequestType::Access((key, access, response)) => {
                    let res = match cache.region_mut(&key) {
                        Some(region) => {
                            access(region);
                            Ok(())
                        }
                        None => Err(RegionCacheError::NotTracked(format!("{:?}", key))),
                    };
                    let _ = response.send(res);
                }
                RequestType::Acquire((key, response)) => {
                    let res = cache.acquire(&key).map(|_| ());
                    let _ = response.send(res);
                }
                RequestType::AcquireIfExists((key, response)) => {
                    let res = cache.acquire_if_exists(&key).map(|r| r.is_some());
                    let _ = response.send(res);
                }
                RequestType::AllKeys(response) => {
                    let res = cache
                        .all_keys()
                        .and_then(|keys| keys.collect::<Result<Vec<K>, RegionCacheError>>());
                    let _ = response.send(res);
                }
                RequestType::OpenCount(response) => {
                    let _ = response.send(cache.open_count());
                }
                RequestType::Release((key, response)) => {
                    let res = cache.release(&key);
                    let _ = response.send(res);
                }
                RequestType::Shutdown(response) => {
                    if shutdown_sender.is_some() {
                        //Already shutting down, dropping the sender tells the caller
                        continue;
                    }
                    shutdown_sender = Some(response);
                    //Anything already queued still gets served before the cache closes
                    receive_queue.close();
                    debug!("Region Executor: Got shutdown request");
                }
            }
        }

        match shutdown_sender {
            Some(s) => {
                let report = cache.shutdown();
                s.send(report)
                    .unwrap_or_else(|_| warn!("Unable to signal shutdown."));
            }
            None => {
                error!("Region Executor: every manager was dropped without a shutdown!");
            }
        }
    }
}
