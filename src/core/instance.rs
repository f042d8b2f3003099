//! Framework-facing value types and their mapping to and from server DTOs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::endpoint::format_host;
use crate::ports::Instance;

/// Metadata key holding the URL scheme of a registered endpoint
pub const METADATA_SCHEME: &str = "scheme";
/// Legacy spelling of [`METADATA_SCHEME`], accepted when reading
pub const METADATA_KIND: &str = "kind";
pub const METADATA_ID: &str = "id";
pub const METADATA_NAME: &str = "name";
pub const METADATA_VERSION: &str = "version";

/// Scheme assumed for hosts registered without scheme metadata
const FALLBACK_SCHEME: &str = "http";

/// Separator the server uses between group and service name
const GROUPED_NAME_SEPARATOR: &str = "@@";

/// One configuration document as seen by the host framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One service instance as seen by the host framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    /// Build the registration metadata for one endpoint of this instance.
    ///
    /// Caller metadata is kept; reserved keys are overwritten.
    pub fn registration_metadata(&self, scheme: &str) -> HashMap<String, String> {
        let mut metadata = self.metadata.clone();
        metadata.insert(METADATA_SCHEME.to_string(), scheme.to_string());
        metadata.insert(METADATA_ID.to_string(), self.id.clone());
        metadata.insert(METADATA_NAME.to_string(), self.name.clone());
        metadata.insert(METADATA_VERSION.to_string(), self.version.clone());
        metadata
    }
}

/// Strip the `group@@` prefix the server adds to service names
pub fn plain_service_name(name: &str) -> &str {
    name.split_once(GROUPED_NAME_SEPARATOR)
        .map_or(name, |(_, service)| service)
}

/// Scheme recorded in host metadata, if any
fn metadata_scheme(metadata: &HashMap<String, String>) -> Option<&str> {
    metadata
        .get(METADATA_SCHEME)
        .or_else(|| metadata.get(METADATA_KIND))
        .map(String::as_str)
        .filter(|scheme| !scheme.is_empty())
}

/// Translate a host reported by the server into a framework instance.
///
/// The id prefers the server-assigned instance id and falls back to `metadata["id"]`.
/// `service_name` is used when the host itself carries no service name.
pub fn instance_from_host(host: &Instance, service_name: &str) -> ServiceInstance {
    let id = if host.instance_id.is_empty() {
        host.metadata.get(METADATA_ID).cloned().unwrap_or_default()
    } else {
        host.instance_id.clone()
    };
    let name = if host.service_name.is_empty() {
        plain_service_name(service_name)
    } else {
        plain_service_name(&host.service_name)
    };
    let scheme = metadata_scheme(&host.metadata).unwrap_or(FALLBACK_SCHEME);

    ServiceInstance {
        id,
        name: name.to_string(),
        version: host
            .metadata
            .get(METADATA_VERSION)
            .cloned()
            .unwrap_or_default(),
        metadata: host.metadata.clone(),
        endpoints: vec![format!(
            "{}://{}:{}",
            scheme,
            format_host(&host.ip),
            host.port
        )],
    }
}

/// Translate a host list, preserving order
pub fn instances_from_hosts(hosts: &[Instance], service_name: &str) -> Vec<ServiceInstance> {
    hosts
        .iter()
        .map(|host| instance_from_host(host, service_name))
        .collect()
}

/// Normalise hosts from a list query into the shape of a subscription push.
///
/// Reserved metadata keys are filled from what the host reports, and a missing weight
/// falls back to `default_weight`.
pub fn prime_hosts(hosts: Vec<Instance>, service_name: &str, default_weight: f64) -> Vec<Instance> {
    hosts
        .into_iter()
        .map(|mut host| {
            let translated = instance_from_host(&host, service_name);
            let scheme = metadata_scheme(&host.metadata)
                .unwrap_or(FALLBACK_SCHEME)
                .to_string();
            host.metadata.insert(METADATA_SCHEME.to_string(), scheme);
            host.metadata
                .entry(METADATA_ID.to_string())
                .or_insert_with(|| translated.id.clone());
            host.metadata
                .insert(METADATA_NAME.to_string(), translated.name.clone());
            host.metadata
                .entry(METADATA_VERSION.to_string())
                .or_insert_with(|| translated.version.clone());
            if host.service_name.is_empty() {
                host.service_name = translated.name;
            }
            if host.weight <= 0.0 {
                host.weight = default_weight;
            }
            host.enabled = true;
            host
        })
        .collect()
}
