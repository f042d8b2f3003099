use async_trait::async_trait;

use crate::{core::KeyValue, error::Result};

/// Source defines the port a host framework loads configuration through
#[async_trait]
pub trait Source: Send + Sync {
    type Watcher: Watcher;

    /// Load the current documents of this source
    async fn load(&self) -> Result<Vec<KeyValue>>;

    /// Open a stream of changes to this source
    async fn watch(&self) -> Result<Self::Watcher>;
}

/// A pull-style stream of configuration changes.
///
/// `next` returns `Ok(None)` once the stream has ended, either because it was stopped or
/// because its parent cancellation fired.
#[async_trait]
pub trait Watcher: Send {
    async fn next(&mut self) -> Result<Option<Vec<KeyValue>>>;

    async fn stop(&self) -> Result<()>;
}
