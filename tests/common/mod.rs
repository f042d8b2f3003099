// In-memory stand-ins for the server clients, shared by the integration tests
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use nacos_bridge::ports::{
    ClientError, ClientResult, ConfigChange, ConfigClient, ConfigListener, ConfigParam,
    DeregisterInstanceParam, GetServiceParam, Instance, NamingClient, RegisterInstanceParam,
    Service, ServiceChange, SubscribeCallback, SubscribeParam,
};

pub const NAMESPACE: &str = "ns1";

/// Config client keeping documents in memory and calling listeners synchronously
#[derive(Default)]
pub struct FakeConfigClient {
    pub(crate) documents: Mutex<HashMap<ConfigParam, String>>,
    pub(crate) listeners: Mutex<Vec<(ConfigParam, ConfigListener)>>,
    pub cancelled: Mutex<Vec<ConfigParam>>,
    pub fail_get: bool,
    pub fail_listen: bool,
}

impl FakeConfigClient {
    pub fn with_document(group: &str, data_id: &str, content: &str) -> Self {
        let client = Self::default();
        client
            .documents
            .lock()
            .unwrap()
            .insert(ConfigParam::new(data_id, group), content.to_string());
        client
    }

    /// Deliver a change to every live listener, whatever document it listens to
    pub fn broadcast(&self, group: &str, data_id: &str, content: &str) {
        let listeners: Vec<ConfigListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(ConfigChange {
                namespace: NAMESPACE.to_string(),
                group: group.to_string(),
                data_id: data_id.to_string(),
                content: content.to_string(),
            });
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfigClient for FakeConfigClient {
    async fn get_config(&self, param: &ConfigParam) -> ClientResult<String> {
        if self.fail_get {
            return Err(ClientError::Connection("connection refused".to_string()));
        }
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(param)
            .cloned()
            .unwrap_or_default())
    }

    async fn listen_config(
        &self,
        param: ConfigParam,
        listener: ConfigListener,
    ) -> ClientResult<()> {
        if self.fail_listen {
            return Err(ClientError::Timeout(5000));
        }
        self.listeners.lock().unwrap().push((param, listener));
        Ok(())
    }

    async fn cancel_listen_config(
        &self,
        param: &ConfigParam,
        listener: &ConfigListener,
    ) -> ClientResult<()> {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(p, l)| !(p == param && Arc::ptr_eq(l, listener)));
        self.cancelled.lock().unwrap().push(param.clone());
        Ok(())
    }
}

/// Naming client keeping registrations in memory and pushing to subscribers on change
#[derive(Default)]
pub struct FakeNamingClient {
    /// (group, service) -> hosts
    pub(crate) services: Mutex<HashMap<(String, String), Vec<Instance>>>,
    pub(crate) subscribers: Mutex<Vec<(SubscribeParam, SubscribeCallback)>>,
    pub unsubscribed: Mutex<Vec<SubscribeParam>>,
    pub get_calls: AtomicUsize,
    pub fail_subscribe: bool,
    pub fail_get: bool,
    pub fail_unsubscribe: bool,
    /// Delay applied to unsubscribe, to observe teardown from several tasks
    pub unsubscribe_delay: Option<Duration>,
}

impl FakeNamingClient {
    /// Push a snapshot to every subscriber of `(group, service)`
    pub fn push(&self, group: &str, service: &str, hosts: Vec<Instance>) {
        let callbacks: Vec<SubscribeCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.group_name == group && p.service_name == service)
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(Ok(ServiceChange {
                service_name: format!("{group}@@{service}"),
                group_name: group.to_string(),
                hosts: hosts.clone(),
            }));
        }
    }

    /// Deliver a push to every subscriber regardless of what it subscribed to
    pub fn push_raw(&self, change: ServiceChange) {
        let callbacks: Vec<SubscribeCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(Ok(change.clone()));
        }
    }

    pub fn hosts(&self, group: &str, service: &str) -> Vec<Instance> {
        self.services
            .lock()
            .unwrap()
            .get(&(group.to_string(), service.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.lock().unwrap().len()
    }
}

pub fn host(ip: &str, port: u16) -> Instance {
    Instance {
        ip: ip.to_string(),
        port,
        weight: 1.0,
        healthy: true,
        enabled: true,
        ..Default::default()
    }
}

#[async_trait]
impl NamingClient for FakeNamingClient {
    async fn register_instance(&self, param: RegisterInstanceParam) -> ClientResult<bool> {
        let grouped = format!("{}@@{}", param.group_name, param.service_name);
        let instance = Instance {
            instance_id: format!(
                "{}#{}#{}#{}",
                param.ip, param.port, param.cluster_name, grouped
            ),
            ip: param.ip.clone(),
            port: param.port,
            weight: param.weight,
            healthy: param.healthy,
            enabled: param.enabled,
            ephemeral: param.ephemeral,
            cluster_name: param.cluster_name.clone(),
            service_name: grouped,
            metadata: param.metadata.clone(),
        };
        let hosts = {
            let mut services = self.services.lock().unwrap();
            let hosts = services
                .entry((param.group_name.clone(), param.service_name.clone()))
                .or_default();
            hosts.retain(|h| !(h.ip == instance.ip && h.port == instance.port));
            hosts.push(instance);
            hosts.clone()
        };
        self.push(&param.group_name, &param.service_name, hosts);
        Ok(true)
    }

    async fn deregister_instance(&self, param: DeregisterInstanceParam) -> ClientResult<bool> {
        let hosts = {
            let mut services = self.services.lock().unwrap();
            let hosts = services
                .entry((param.group_name.clone(), param.service_name.clone()))
                .or_default();
            hosts.retain(|h| !(h.ip == param.ip && h.port == param.port));
            hosts.clone()
        };
        self.push(&param.group_name, &param.service_name, hosts);
        Ok(true)
    }

    async fn get_service(&self, param: &GetServiceParam) -> ClientResult<Service> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(ClientError::Status {
                url: "http://fake/nacos/v1/ns/instance/list".to_string(),
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(Service {
            name: format!("{}@@{}", param.group_name, param.service_name),
            hosts: self.hosts(&param.group_name, &param.service_name),
        })
    }

    async fn subscribe(
        &self,
        param: SubscribeParam,
        callback: SubscribeCallback,
    ) -> ClientResult<()> {
        if self.fail_subscribe {
            return Err(ClientError::Connection("connection refused".to_string()));
        }
        self.subscribers.lock().unwrap().push((param, callback));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        param: &SubscribeParam,
        callback: &SubscribeCallback,
    ) -> ClientResult<()> {
        if let Some(delay) = self.unsubscribe_delay {
            tokio::time::sleep(delay).await;
        }
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(p, c)| !(p == param && Arc::ptr_eq(c, callback)));
        self.unsubscribed.lock().unwrap().push(param.clone());
        if self.fail_unsubscribe {
            return Err(ClientError::Connection("connection reset".to_string()));
        }
        Ok(())
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
