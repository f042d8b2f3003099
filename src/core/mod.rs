pub mod endpoint;
pub mod instance;
pub mod queue;
pub mod watcher;

pub use endpoint::{Endpoint, resolve_port};
pub use instance::{KeyValue, ServiceInstance};
pub use queue::SnapshotQueue;
pub use watcher::{
    ConfigWatcher, ServiceWatcher, StopHandle, UnsubscribeFn, WatchCore, WatchState,
};
