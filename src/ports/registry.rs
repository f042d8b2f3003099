use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{core::ServiceInstance, error::Result};

/// Registrar defines the port a host framework publishes its own instances through
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, service: &ServiceInstance) -> Result<()>;

    async fn deregister(&self, service: &ServiceInstance) -> Result<()>;
}

/// Discovery defines the port a host framework resolves other services through
#[async_trait]
pub trait Discovery: Send + Sync {
    type Watcher: Watcher;

    /// Fetch the current instances of a service
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>>;

    /// Open a stream of instance snapshots for a service.
    ///
    /// The stream ends when `parent` is cancelled or the watcher is stopped.
    async fn watch(&self, parent: &CancellationToken, name: &str) -> Result<Self::Watcher>;
}

/// A pull-style stream of service instance snapshots.
///
/// `next` returns `Err(Error::Cancelled)` once the stream has ended.
#[async_trait]
pub trait Watcher: Send {
    async fn next(&mut self) -> Result<Vec<ServiceInstance>>;

    async fn stop(&self) -> Result<()>;
}
