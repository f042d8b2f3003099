use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::{ClientError, ClientResult};

/// Parameters of a single instance registration
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterInstanceParam {
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub enabled: bool,
    pub healthy: bool,
    pub ephemeral: bool,
    pub metadata: HashMap<String, String>,
    pub cluster_name: String,
    pub service_name: String,
    pub group_name: String,
}

/// Parameters of a single instance deregistration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterInstanceParam {
    pub ip: String,
    pub port: u16,
    pub cluster_name: String,
    pub service_name: String,
    pub group_name: String,
    pub ephemeral: bool,
}

/// Parameters of an instance list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetServiceParam {
    pub service_name: String,
    pub group_name: String,
    pub clusters: Vec<String>,
}

/// Identifies one subscription; the same value is used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscribeParam {
    pub service_name: String,
    pub group_name: String,
    pub clusters: Vec<String>,
}

/// One registered host as reported by the server.
///
/// The same shape is used for list queries and for subscription pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub healthy: bool,
    pub enabled: bool,
    pub ephemeral: bool,
    pub cluster_name: String,
    pub service_name: String,
    pub metadata: HashMap<String, String>,
}

/// Result of an instance list query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub hosts: Vec<Instance>,
}

/// A pushed snapshot of a subscribed service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceChange {
    pub service_name: String,
    pub group_name: String,
    pub hosts: Vec<Instance>,
}

/// Callback invoked by the client with every pushed snapshot or subscription failure.
pub type SubscribeCallback = Arc<dyn Fn(Result<ServiceChange, ClientError>) + Send + Sync>;

/// NamingClient defines the port (interface) to the naming half of the server
#[async_trait]
pub trait NamingClient: Send + Sync + 'static {
    /// Register one instance, returning whether the server accepted it
    async fn register_instance(&self, param: RegisterInstanceParam) -> ClientResult<bool>;

    /// Deregister one instance, returning whether the server accepted it
    async fn deregister_instance(&self, param: DeregisterInstanceParam) -> ClientResult<bool>;

    /// Query the current instances of a service
    async fn get_service(&self, param: &GetServiceParam) -> ClientResult<Service>;

    /// Start pushing snapshots of a service to `callback`.
    ///
    /// Returns once the server has accepted the subscription.
    async fn subscribe(&self, param: SubscribeParam, callback: SubscribeCallback)
    -> ClientResult<()>;

    /// Stop pushing snapshots to `callback` for a subscription created with the same
    /// parameters. Other subscriptions of the same service are left running.
    async fn unsubscribe(&self, param: &SubscribeParam, callback: &SubscribeCallback)
    -> ClientResult<()>;
}
