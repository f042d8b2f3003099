//! nacos-bridge - configuration source and service registry adapters for a Nacos server.
//!
//! The crate bridges two framework-facing abstractions to a remote naming and
//! configuration service:
//!
//! - a **configuration source** ([`NacosSource`]) that loads a document identified by
//!   `(namespace, group, data_id)` and streams every later version of it, and
//! - a **service registry** ([`NacosRegistry`]) that registers and deregisters instances,
//!   lists the instances of a service and streams instance snapshots.
//!
//! Both streams are pull-style watchers built on a bounded, latest-wins snapshot queue.
//! A watcher owns its upstream subscription and releases it exactly once, whether it is
//! stopped explicitly, dropped, or cancelled through its parent token.
//!
//! # Quick Example
//! ```no_run
//! use nacos_bridge::{NacosRegistry, RegistryOptions};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let options = RegistryOptions::builder("http://127.0.0.1:8848", "public")
//!     .group("DEFAULT_GROUP")
//!     .build()?;
//! let registry = NacosRegistry::new(options)?;
//!
//! let mut watcher = registry.watch("orders").await?;
//! while let Ok(instances) = watcher.next().await {
//!     println!("{} instances", instances.len());
//! }
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the watcher machinery inside `core`. Upstream ports ([`ports::ConfigClient`],
//! [`ports::NamingClient`]) describe the server SDK; the bundled HTTP clients implement them,
//! and any other SDK can be plugged in through [`adapters::ClientFactory`].
//!
//! # Error Handling
//! Library APIs return [`Result`] with the crate's [`Error`], which names the failed
//! operation target and keeps the client error as its source. The adapters never retry.
//! The command line tool and the settings loader use `eyre`.
pub mod config;
pub mod ports;
pub mod tracing_setup;

pub mod adapters;
pub mod core;
pub mod error;

pub use crate::{
    adapters::{ClientFactory, HttpClientFactory, NacosRegistry, NacosSource},
    config::{ClientOptions, ConfigOptions, LogLevel, RegistryOptions},
    core::{ConfigWatcher, KeyValue, ServiceInstance, ServiceWatcher, StopHandle, WatchState},
    error::{Error, Result},
};
