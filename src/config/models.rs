//! Option records for the configuration source and the service registry.
//!
//! Both records are serde-friendly so they can be loaded from files or the environment,
//! and both come with a builder for programmatic assembly. Any field left at its zero
//! value (empty string, `0`) takes its documented default when the options are built.
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use super::validation::OptionsValidator;
use crate::{
    core::Endpoint,
    error::{Error, Result},
};

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
pub const DEFAULT_CLUSTER: &str = "DEFAULT";
pub const DEFAULT_WEIGHT: f64 = 100.0;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CONTEXT_PATH: &str = "nacos";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CONFIG_WATCH_CAPACITY: usize = 1;
pub const DEFAULT_REGISTRY_WATCH_CAPACITY: usize = 100;

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_context_path() -> String {
    DEFAULT_CONTEXT_PATH.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_config_watch_capacity() -> usize {
    DEFAULT_CONFIG_WATCH_CAPACITY
}

fn default_registry_watch_capacity() -> usize {
    DEFAULT_REGISTRY_WATCH_CAPACITY
}

fn default_healthy() -> bool {
    true
}

/// Verbosity of the client internals
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Error::invalid_option(
                "log_level",
                format!("'{other}' is not one of debug, info, warn, error"),
            )),
        }
    }
}

/// Options shared by the configuration and naming clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClientOptions {
    /// Address of the server, e.g. `http://10.0.0.1:8848`
    pub endpoint: String,
    /// Tenant namespace
    pub namespace_id: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Timeout of every client call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// HTTP path prefix the server is mounted under
    #[serde(default = "default_context_path")]
    pub context_path: String,
    /// Period of listener and subscription polling in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ClientOptions {
    pub fn new(endpoint: impl Into<String>, namespace_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace_id: namespace_id.into(),
            group: String::new(),
            timeout_ms: 0,
            log_level: LogLevel::default(),
            log_dir: None,
            cache_dir: None,
            context_path: String::new(),
            poll_interval_ms: 0,
        }
        .with_defaults()
    }

    /// Replace zero-valued fields with their defaults
    pub fn with_defaults(mut self) -> Self {
        if self.group.is_empty() {
            self.group = default_group();
        }
        if self.timeout_ms == 0 {
            self.timeout_ms = default_timeout_ms();
        }
        let trimmed = self.context_path.trim_matches('/');
        self.context_path = if trimmed.is_empty() {
            default_context_path()
        } else {
            trimmed.to_string()
        };
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
        }
        self
    }

    /// Parsed server address
    pub fn server(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Options of a configuration source
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigOptions {
    pub client: ClientOptions,
    /// Identifier of the watched document
    pub data_id: String,
    /// Capacity of each watcher's snapshot queue
    #[serde(default = "default_config_watch_capacity")]
    pub watch_capacity: usize,
}

impl ConfigOptions {
    pub fn builder(
        endpoint: impl Into<String>,
        namespace_id: impl Into<String>,
    ) -> ConfigOptionsBuilder {
        ConfigOptionsBuilder {
            client: ClientOptionsBuilder::new(endpoint, namespace_id),
            data_id: None,
            watch_capacity: None,
        }
    }

    pub fn with_defaults(mut self) -> Self {
        self.client = self.client.with_defaults();
        if self.watch_capacity == 0 {
            self.watch_capacity = default_config_watch_capacity();
        }
        self
    }

    /// Apply defaults, then validate
    pub fn finish(self) -> Result<Self> {
        let options = self.with_defaults();
        OptionsValidator::validate_config(&options)?;
        Ok(options)
    }

    pub fn group(&self) -> &str {
        &self.client.group
    }
}

/// Options of a service registry
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RegistryOptions {
    pub client: ClientOptions,
    /// Cluster instances are registered into
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Load weight advertised at registration
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Health flag advertised at registration
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    /// Endpoint schemes that are never registered, e.g. `["http"]`
    #[serde(default)]
    pub skip_schemes: Vec<String>,
    /// Cluster filter for subscriptions; empty means every cluster
    #[serde(default)]
    pub clusters: Vec<String>,
    /// Capacity of each watcher's snapshot queue
    #[serde(default = "default_registry_watch_capacity")]
    pub watch_capacity: usize,
    /// Heartbeat period of ephemeral instances in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl RegistryOptions {
    pub fn builder(
        endpoint: impl Into<String>,
        namespace_id: impl Into<String>,
    ) -> RegistryOptionsBuilder {
        RegistryOptionsBuilder {
            client: ClientOptionsBuilder::new(endpoint, namespace_id),
            cluster: None,
            weight: None,
            healthy: None,
            skip_schemes: Vec::new(),
            clusters: Vec::new(),
            watch_capacity: None,
            heartbeat_interval_ms: None,
        }
    }

    pub fn with_defaults(mut self) -> Self {
        self.client = self.client.with_defaults();
        if self.cluster.is_empty() {
            self.cluster = default_cluster();
        }
        if self.weight == 0.0 {
            self.weight = default_weight();
        }
        if self.watch_capacity == 0 {
            self.watch_capacity = default_registry_watch_capacity();
        }
        if self.heartbeat_interval_ms == 0 {
            self.heartbeat_interval_ms = default_heartbeat_interval_ms();
        }
        self
    }

    /// Apply defaults, then validate
    pub fn finish(self) -> Result<Self> {
        let options = self.with_defaults();
        OptionsValidator::validate_registry(&options)?;
        Ok(options)
    }

    pub fn group(&self) -> &str {
        &self.client.group
    }

    /// Whether endpoints with this scheme are left out of registration
    pub fn skips_scheme(&self, scheme: &str) -> bool {
        self.skip_schemes
            .iter()
            .any(|skipped| skipped.eq_ignore_ascii_case(scheme))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Collects the options shared by both builders
#[derive(Debug, Clone)]
pub struct ClientOptionsBuilder {
    endpoint: String,
    namespace_id: String,
    group: Option<String>,
    timeout_ms: Option<u64>,
    log_level: Option<LogLevel>,
    log_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    context_path: Option<String>,
    poll_interval_ms: Option<u64>,
}

impl ClientOptionsBuilder {
    fn new(endpoint: impl Into<String>, namespace_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace_id: namespace_id.into(),
            group: None,
            timeout_ms: None,
            log_level: None,
            log_dir: None,
            cache_dir: None,
            context_path: None,
            poll_interval_ms: None,
        }
    }

    fn build(self) -> ClientOptions {
        ClientOptions {
            endpoint: self.endpoint,
            namespace_id: self.namespace_id,
            group: self.group.unwrap_or_default(),
            timeout_ms: self.timeout_ms.unwrap_or_default(),
            log_level: self.log_level.unwrap_or_default(),
            log_dir: self.log_dir,
            cache_dir: self.cache_dir,
            context_path: self.context_path.unwrap_or_default(),
            poll_interval_ms: self.poll_interval_ms.unwrap_or_default(),
        }
        .with_defaults()
    }
}

/// Setters for the shared client options, forwarded by both builders
macro_rules! client_option_setters {
    () => {
        pub fn group(mut self, group: impl Into<String>) -> Self {
            self.client.group = Some(group.into());
            self
        }

        pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
            self.client.timeout_ms = Some(timeout_ms);
            self
        }

        pub fn log_level(mut self, log_level: LogLevel) -> Self {
            self.client.log_level = Some(log_level);
            self
        }

        pub fn log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
            self.client.log_dir = Some(log_dir.into());
            self
        }

        pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
            self.client.cache_dir = Some(cache_dir.into());
            self
        }

        pub fn context_path(mut self, context_path: impl Into<String>) -> Self {
            self.client.context_path = Some(context_path.into());
            self
        }

        pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
            self.client.poll_interval_ms = Some(poll_interval_ms);
            self
        }
    };
}

/// Builder for [`ConfigOptions`]
#[derive(Debug, Clone)]
pub struct ConfigOptionsBuilder {
    client: ClientOptionsBuilder,
    data_id: Option<String>,
    watch_capacity: Option<usize>,
}

impl ConfigOptionsBuilder {
    client_option_setters!();

    pub fn data_id(mut self, data_id: impl Into<String>) -> Self {
        self.data_id = Some(data_id.into());
        self
    }

    pub fn watch_capacity(mut self, watch_capacity: usize) -> Self {
        self.watch_capacity = Some(watch_capacity);
        self
    }

    pub fn build(self) -> Result<ConfigOptions> {
        ConfigOptions {
            client: self.client.build(),
            data_id: self.data_id.unwrap_or_default(),
            watch_capacity: self.watch_capacity.unwrap_or_default(),
        }
        .finish()
    }
}

/// Builder for [`RegistryOptions`]
#[derive(Debug, Clone)]
pub struct RegistryOptionsBuilder {
    client: ClientOptionsBuilder,
    cluster: Option<String>,
    weight: Option<f64>,
    healthy: Option<bool>,
    skip_schemes: Vec<String>,
    clusters: Vec<String>,
    watch_capacity: Option<usize>,
    heartbeat_interval_ms: Option<u64>,
}

impl RegistryOptionsBuilder {
    client_option_setters!();

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn healthy(mut self, healthy: bool) -> Self {
        self.healthy = Some(healthy);
        self
    }

    pub fn skip_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.skip_schemes.push(scheme.into());
        self
    }

    pub fn subscribe_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.clusters.push(cluster.into());
        self
    }

    pub fn watch_capacity(mut self, watch_capacity: usize) -> Self {
        self.watch_capacity = Some(watch_capacity);
        self
    }

    pub fn heartbeat_interval_ms(mut self, heartbeat_interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(heartbeat_interval_ms);
        self
    }

    pub fn build(self) -> Result<RegistryOptions> {
        RegistryOptions {
            client: self.client.build(),
            cluster: self.cluster.unwrap_or_default(),
            weight: self.weight.unwrap_or_default(),
            healthy: self.healthy.unwrap_or_else(default_healthy),
            skip_schemes: self.skip_schemes,
            clusters: self.clusters,
            watch_capacity: self.watch_capacity.unwrap_or_default(),
            heartbeat_interval_ms: self.heartbeat_interval_ms.unwrap_or_default(),
        }
        .finish()
    }
}

/// Logging section of [`BridgeSettings`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive; falls back to the options' log level when unset
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Top-level settings file of the command line tool
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct BridgeSettings {
    pub source: Option<ConfigOptions>,
    pub registry: Option<RegistryOptions>,
    pub logging: LoggingSettings,
}
