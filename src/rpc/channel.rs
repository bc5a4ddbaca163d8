use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::engine::{Engine, EngineFault, EngineRequest, EngineResponse, Envelope, Reply, RequestId};

use super::config::RpcConfig;
use super::error::RpcError;

type ReplySlot = oneshot::Sender<Result<EngineResponse, EngineFault>>;
type PendingTable = DashMap<RequestId, ReplySlot>;

/// Asynchronous request/response multiplexer to the execution engine.
///
/// Requests are queued to a pool of engine worker threads; replies come back
/// on a single reply channel and a router thread resolves each one by its
/// correlation id.
///
/// # Architecture
///
/// ```text
/// ┌──────────┐  Envelope{id}   ┌────────────────┐  Reply{id}   ┌────────┐
/// │ callers  │ ──────────────▶ │ msz-engine-N   │ ───────────▶ │ router │
/// │ (async)  │                 │ Engine::handle │              │        │
/// │          │ ◀─────────── oneshot per id ─────────────────── │        │
/// └──────────┘        pending: DashMap<RequestId, Sender>      └────────┘
/// ```
///
/// Only the reply whose id matches a pending entry resolves that entry, so
/// concurrent calls of the same operation never see each other's results.
///
/// `RpcChannel` is cheap to clone; all clones share one worker pool.
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<Inner>,
}

struct Inner {
    /// Request queue (None after shutdown)
    requests: Mutex<Option<Sender<Envelope>>>,
    /// Callers waiting for a reply, keyed by correlation id
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    config: RpcConfig,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Removes the pending entry when a call settles, times out or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl RpcChannel {
    /// Start a channel with the default configuration
    pub fn new<E: Engine>(engine: E) -> Result<Self, RpcError> {
        Self::spawn(Arc::new(engine), RpcConfig::default())
    }

    /// Start the worker pool and router for an engine.
    ///
    /// Worker threads are named `msz-engine-{n}`; the router is named
    /// `msz-rpc-router`.
    pub fn spawn(engine: Arc<dyn Engine>, config: RpcConfig) -> Result<Self, RpcError> {
        let (request_tx, request_rx) = unbounded::<Envelope>();
        let (reply_tx, reply_rx) = unbounded::<Reply>();
        let pending: Arc<PendingTable> = Arc::new(DashMap::new());
        let mut threads = Vec::with_capacity(config.worker_threads + 1);

        for n in 0..config.worker_threads.max(1) {
            let engine = Arc::clone(&engine);
            let requests = request_rx.clone();
            let replies = reply_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("msz-engine-{}", n))
                .spawn(move || run_worker(engine, requests, replies))
                .map_err(|e| RpcError::Spawn(e.to_string()))?;
            threads.push(handle);
        }
        // Only workers hold reply senders, so the router exits once they do.
        drop(reply_tx);

        let router_pending = Arc::clone(&pending);
        let router = thread::Builder::new()
            .name("msz-rpc-router".to_string())
            .spawn(move || run_router(router_pending, reply_rx))
            .map_err(|e| RpcError::Spawn(e.to_string()))?;
        threads.push(router);

        Ok(Self {
            inner: Arc::new(Inner {
                requests: Mutex::new(Some(request_tx)),
                pending,
                next_id: AtomicU64::new(1),
                config,
                threads: Mutex::new(threads),
            }),
        })
    }

    /// Channel configuration
    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    /// Number of calls currently awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Timeout applied to a request by default
    pub fn timeout_for(&self, request: &EngineRequest) -> Duration {
        if request.is_conversion() {
            self.inner.config.conversion_timeout
        } else {
            self.inner.config.call_timeout
        }
    }

    /// Send a request and wait for its reply, using the default timeout and no
    /// cancellation.
    pub async fn call(&self, request: EngineRequest) -> Result<EngineResponse, RpcError> {
        let timeout = self.timeout_for(&request);
        self.call_with(request, &CancellationToken::new(), timeout).await
    }

    /// Send a request and wait for the reply carrying its correlation id.
    ///
    /// Fails with [`RpcError::Cancelled`] if `cancel` fires first and with
    /// [`RpcError::Timeout`] if no reply arrives within `timeout`. Either
    /// way the pending entry is removed and a late reply is discarded.
    pub async fn call_with(
        &self,
        request: EngineRequest,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<EngineResponse, RpcError> {
        let tag = request.tag();
        if cancel.is_cancelled() {
            return Err(RpcError::Cancelled { tag });
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id,
        };

        debug!("rpc {} {} dispatched", id, tag);
        self.send(Envelope { id, request })?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("rpc {} {} cancelled", id, tag);
                Err(RpcError::Cancelled { tag })
            }
            outcome = tokio::time::timeout(timeout, rx) => match outcome {
                Err(_) => {
                    warn!("rpc {} {} timed out after {:?}", id, tag, timeout);
                    Err(RpcError::Timeout { tag, after: timeout })
                }
                Ok(Err(_)) => Err(RpcError::ChannelClosed),
                Ok(Ok(result)) => {
                    debug!("rpc {} {} replied", id, tag);
                    result.map_err(|fault| RpcError::Engine { tag, fault })
                }
            }
        }
    }

    /// Queue a request without waiting for its reply.
    ///
    /// Used where a caller cannot await, such as releasing a descriptor from
    /// `Drop`. The reply is discarded by the router.
    pub fn post(&self, request: EngineRequest) -> Result<RequestId, RpcError> {
        let id = self.next_id();
        debug!("rpc {} {} posted", id, request.tag());
        self.send(Envelope { id, request })?;
        Ok(id)
    }

    /// Stop accepting requests and wait for the worker pool to drain.
    ///
    /// Requests already queued are still handled. Blocks until every worker
    /// and the router have exited.
    pub fn shutdown(&self) {
        self.close_queue();
        let handles: Vec<_> = {
            let mut threads = self
                .inner
                .threads
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            threads.drain(..).collect()
        };
        for handle in handles {
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                warn!("engine thread {:?} panicked during shutdown", name);
            }
        }
    }

    /// Whether the channel still accepts requests
    pub fn is_open(&self) -> bool {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn close_queue(&self) {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn send(&self, envelope: Envelope) -> Result<(), RpcError> {
        let guard = self
            .inner
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.send(envelope).map_err(|_| RpcError::ChannelClosed),
            None => Err(RpcError::ChannelClosed),
        }
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.pending.len())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Disconnecting the queue lets workers and the router exit on their
        // own; a worker may be inside a long conversion, so do not join here.
        let sender = self
            .requests
            .get_mut()
            .map(Option::take)
            .unwrap_or_else(|poisoned| poisoned.into_inner().take());
        if sender.is_some() {
            debug!("rpc channel dropped without shutdown, detaching engine threads");
        }
    }
}

fn run_worker(engine: Arc<dyn Engine>, requests: Receiver<Envelope>, replies: Sender<Reply>) {
    for Envelope { id, request } in requests {
        let tag = request.tag();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| engine.handle(request))) {
            Ok(result) => result,
            Err(_) => Err(EngineFault::new(format!("engine panicked while handling {}", tag))),
        };
        if replies.send(Reply { id, result }).is_err() {
            break;
        }
    }
}

fn run_router(pending: Arc<PendingTable>, replies: Receiver<Reply>) {
    for reply in replies {
        match pending.remove(&reply.id) {
            Some((_, slot)) => {
                // The caller may have given up between lookup and send.
                let _ = slot.send(reply.result);
            }
            None => debug!("discarding reply {} with no pending caller", reply.id),
        }
    }
}
