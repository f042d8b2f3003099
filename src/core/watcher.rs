//! Pull-style watch streams over push-style subscriptions.
//!
//! A client callback pushes snapshots into a bounded [`SnapshotQueue`]; the single owner of
//! the watcher pulls them with `next()`. Each watcher runs the lifecycle
//! `Subscribing -> Active -> Closing -> Closed`. Teardown (explicit stop, drop, or
//! cancellation of the parent token) cancels the watcher's token and releases the
//! upstream subscription exactly once.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{
    instance::{KeyValue, ServiceInstance, instances_from_hosts},
    queue::SnapshotQueue,
};
use crate::{
    error::{Error, Result},
    ports::{ClientResult, Instance, registry, source},
};

/// Releases the upstream subscription of a watcher
pub type UnsubscribeFn = Arc<dyn Fn() -> BoxFuture<'static, ClientResult<()>> + Send + Sync>;

/// Lifecycle state of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    Subscribing = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Subscribing,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

struct Lifecycle {
    state: AtomicU8,
    token: CancellationToken,
    unsubscribe: UnsubscribeFn,
    target: String,
}

impl Lifecycle {
    fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run teardown once; later calls only make sure the token is cancelled
    async fn teardown(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                WatchState::Active as u8,
                WatchState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            self.token.cancel();
            return Ok(());
        }

        self.token.cancel();
        let result = (self.unsubscribe)().await;
        self.state
            .store(WatchState::Closed as u8, Ordering::Release);

        match result {
            Ok(()) => {
                tracing::info!("Watcher for {} closed", self.target);
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    "Watcher for {} closed, but unsubscribe failed: {}",
                    self.target,
                    source
                );
                Err(Error::Unsubscribe {
                    target: self.target.clone(),
                    source,
                })
            }
        }
    }
}

/// Cloneable handle that stops a watcher from another task.
///
/// Useful when the owning task is parked in `next()`.
#[derive(Clone)]
pub struct StopHandle {
    lifecycle: Arc<Lifecycle>,
}

impl StopHandle {
    /// Tear the watcher down; see [`ServiceWatcher::stop`]
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.teardown().await
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle.token.is_cancelled()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("target", &self.lifecycle.target)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

/// Queue, token and lifecycle shared by both watcher kinds
pub struct WatchCore<T> {
    queue: Arc<SnapshotQueue<T>>,
    lifecycle: Arc<Lifecycle>,
}

impl<T: Send + 'static> WatchCore<T> {
    /// Create a watcher in the `Subscribing` state.
    ///
    /// Its token is a child of `parent`, so cancelling the parent ends the stream.
    pub fn new(
        parent: &CancellationToken,
        capacity: usize,
        target: impl Into<String>,
        unsubscribe: UnsubscribeFn,
    ) -> Self {
        Self::with_queue(
            parent,
            Arc::new(SnapshotQueue::new(capacity)),
            target,
            unsubscribe,
        )
    }

    /// Same as [`WatchCore::new`] over a queue created up front, for callbacks that
    /// must exist before the unsubscribe function capturing them.
    pub fn with_queue(
        parent: &CancellationToken,
        queue: Arc<SnapshotQueue<T>>,
        target: impl Into<String>,
        unsubscribe: UnsubscribeFn,
    ) -> Self {
        Self {
            queue,
            lifecycle: Arc::new(Lifecycle {
                state: AtomicU8::new(WatchState::Subscribing as u8),
                token: parent.child_token(),
                unsubscribe,
                target: target.into(),
            }),
        }
    }

    /// The queue the subscription callback pushes into
    pub fn producer(&self) -> Arc<SnapshotQueue<T>> {
        self.queue.clone()
    }

    /// Mark the subscription as accepted.
    ///
    /// From here on, cancellation of the token (parent cancelled or watcher dropped)
    /// triggers teardown in the background. Must be called inside a Tokio runtime.
    pub fn activate(&self) {
        if self
            .lifecycle
            .state
            .compare_exchange(
                WatchState::Subscribing as u8,
                WatchState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            lifecycle.token.cancelled().await;
            // Errors are already logged by teardown
            let _ = lifecycle.teardown().await;
        });
        tracing::debug!("Watcher for {} is active", self.lifecycle.target);
    }

    /// Abandon a watcher whose subscription was refused
    pub fn abort(&self) {
        self.lifecycle
            .state
            .store(WatchState::Closed as u8, Ordering::Release);
        self.lifecycle.token.cancel();
        self.queue.clear();
    }

    /// Wait for the next snapshot; `None` once the watcher is cancelled.
    ///
    /// Snapshots still queued at cancellation are never returned.
    pub async fn recv(&mut self) -> Option<T> {
        let token = &self.lifecycle.token;
        loop {
            if token.is_cancelled() {
                return None;
            }
            if let Some(item) = self.queue.pop() {
                return Some(item);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                _ = self.queue.notified() => {}
            }
        }
    }

    /// Tear down once; calls racing the first one return `Ok(())` without waiting for it
    pub async fn stop(&self) -> Result<()> {
        let result = self.lifecycle.teardown().await;
        self.queue.clear();
        result
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            lifecycle: self.lifecycle.clone(),
        }
    }

    pub fn state(&self) -> WatchState {
        self.lifecycle.state()
    }

    pub fn target(&self) -> &str {
        &self.lifecycle.target
    }
}

impl<T> Drop for WatchCore<T> {
    fn drop(&mut self) {
        self.lifecycle.token.cancel();
    }
}

/// Stream of changes to one configuration document.
///
/// `next` returns `Ok(None)` once the watcher has been stopped, dropped by its parent
/// scope, or cancelled through its parent token.
pub struct ConfigWatcher {
    core: WatchCore<String>,
    data_id: String,
}

impl ConfigWatcher {
    pub fn new(core: WatchCore<String>, data_id: impl Into<String>) -> Self {
        Self {
            core,
            data_id: data_id.into(),
        }
    }

    /// Wait for the next version of the document
    pub async fn next(&mut self) -> Result<Option<Vec<KeyValue>>> {
        Ok(self
            .core
            .recv()
            .await
            .map(|content| vec![KeyValue::new(self.data_id.clone(), content)]))
    }

    /// Stop watching and cancel the upstream listener.
    ///
    /// Only the first call reaches the server and reports its result. Later calls return
    /// `Ok(())` right away, even while the first is still waiting on the server, so the
    /// state may read `Closing` rather than `Closed` when they return.
    pub async fn stop(&self) -> Result<()> {
        self.core.stop().await
    }

    /// Alias of [`ConfigWatcher::stop`]
    pub async fn close(&self) -> Result<()> {
        self.stop().await
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.core.stop_handle()
    }

    pub fn state(&self) -> WatchState {
        self.core.state()
    }

    pub fn data_id(&self) -> &str {
        &self.data_id
    }
}

#[async_trait]
impl source::Watcher for ConfigWatcher {
    async fn next(&mut self) -> Result<Option<Vec<KeyValue>>> {
        ConfigWatcher::next(self).await
    }

    async fn stop(&self) -> Result<()> {
        ConfigWatcher::stop(self).await
    }
}

/// Stream of instance snapshots of one service.
///
/// `next` returns `Err(Error::Cancelled)` once the watcher has been stopped or its
/// parent token cancelled.
pub struct ServiceWatcher {
    core: WatchCore<Vec<Instance>>,
    service_name: String,
}

impl ServiceWatcher {
    pub fn new(core: WatchCore<Vec<Instance>>, service_name: impl Into<String>) -> Self {
        Self {
            core,
            service_name: service_name.into(),
        }
    }

    /// Wait for the next instance snapshot
    pub async fn next(&mut self) -> Result<Vec<ServiceInstance>> {
        match self.core.recv().await {
            Some(hosts) => Ok(instances_from_hosts(&hosts, &self.service_name)),
            None => Err(Error::Cancelled),
        }
    }

    /// Stop watching and unsubscribe upstream.
    ///
    /// Only the first call reaches the server and reports its result. Later calls return
    /// `Ok(())` right away, even while the first is still waiting on the server, so the
    /// state may read `Closing` rather than `Closed` when they return.
    pub async fn stop(&self) -> Result<()> {
        self.core.stop().await
    }

    /// Alias of [`ServiceWatcher::stop`]
    pub async fn close(&self) -> Result<()> {
        self.stop().await
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.core.stop_handle()
    }

    pub fn state(&self) -> WatchState {
        self.core.state()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[async_trait]
impl registry::Watcher for ServiceWatcher {
    async fn next(&mut self) -> Result<Vec<ServiceInstance>> {
        ServiceWatcher::next(self).await
    }

    async fn stop(&self) -> Result<()> {
        ServiceWatcher::stop(self).await
    }
}
