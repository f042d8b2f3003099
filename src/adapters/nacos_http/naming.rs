use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{NacosHttp, PollTasks, callback_id};
use crate::{
    config::ClientOptions,
    ports::{
        ClientError, ClientResult, DeregisterInstanceParam, GetServiceParam, Instance,
        NamingClient, RegisterInstanceParam, Service, ServiceChange, SubscribeCallback,
        SubscribeParam,
    },
};

const INSTANCE_PATH: &str = "/v1/ns/instance";
const INSTANCE_LIST_PATH: &str = "/v1/ns/instance/list";
const BEAT_PATH: &str = "/v1/ns/instance/beat";

/// Identifies the heartbeat task of one registered instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BeatKey {
    service_name: String,
    group_name: String,
    cluster_name: String,
    ip: String,
    port: u16,
}

/// Naming client that registers over HTTP, keeps ephemeral instances alive with
/// heartbeats and serves subscriptions by polling the instance list.
pub struct HttpNamingClient {
    http: NacosHttp,
    namespace_id: String,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    subscriptions: PollTasks<SubscribeParam>,
    heartbeats: PollTasks<BeatKey>,
}

fn grouped_name(group: &str, service: &str) -> String {
    format!("{group}@@{service}")
}

/// Whether the server acknowledged a write
fn acknowledged(body: &str) -> bool {
    body.trim().eq_ignore_ascii_case("ok")
}

/// Stable order so snapshots can be compared
fn sorted_hosts(mut hosts: Vec<Instance>) -> Vec<Instance> {
    hosts.sort_by(|a, b| {
        (&a.ip, a.port, &a.cluster_name).cmp(&(&b.ip, b.port, &b.cluster_name))
    });
    hosts
}

impl HttpNamingClient {
    pub fn new(options: &ClientOptions, heartbeat_interval: Duration) -> ClientResult<Self> {
        let http = NacosHttp::new(options)?;
        tracing::info!(
            "Created naming client for {} (namespace '{}')",
            http.base_url(),
            options.namespace_id
        );
        Ok(Self {
            http,
            namespace_id: options.namespace_id.clone(),
            poll_interval: options.poll_interval(),
            heartbeat_interval,
            subscriptions: PollTasks::new(),
            heartbeats: PollTasks::new(),
        })
    }

    async fn list(
        http: &NacosHttp,
        namespace_id: &str,
        param: &GetServiceParam,
    ) -> ClientResult<Service> {
        let query = vec![
            ("serviceName", param.service_name.clone()),
            ("groupName", param.group_name.clone()),
            ("namespaceId", namespace_id.to_string()),
            ("clusters", param.clusters.join(",")),
            ("healthyOnly", "false".to_string()),
        ];
        let body = http
            .execute_ok(Method::GET, INSTANCE_LIST_PATH, &query, None)
            .await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn beat(
        http: &NacosHttp,
        namespace_id: &str,
        param: &RegisterInstanceParam,
    ) -> ClientResult<()> {
        let service = grouped_name(&param.group_name, &param.service_name);
        let beat = serde_json::json!({
            "cluster": param.cluster_name,
            "ip": param.ip,
            "port": param.port,
            "metadata": param.metadata,
            "scheduled": true,
            "serviceName": service,
            "weight": param.weight,
        });
        let query = vec![
            ("serviceName", service.clone()),
            ("groupName", param.group_name.clone()),
            ("namespaceId", namespace_id.to_string()),
            ("ephemeral", "true".to_string()),
            ("beat", beat.to_string()),
        ];
        http.execute_ok(Method::PUT, BEAT_PATH, &query, None)
            .await
            .map(|_| ())
    }

    fn spawn_heartbeat(&self, param: RegisterInstanceParam, token: CancellationToken) {
        let http = self.http.clone();
        let namespace_id = self.namespace_id.clone();
        let heartbeat_interval = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = Self::beat(&http, &namespace_id, &param).await {
                    tracing::warn!(
                        "Heartbeat for {}:{} of service {} failed: {}",
                        param.ip,
                        param.port,
                        param.service_name,
                        e
                    );
                }
            }
            tracing::debug!(
                "Stopped heartbeat for {}:{} of service {}",
                param.ip,
                param.port,
                param.service_name
            );
        });
    }

    /// Number of instances currently kept alive by heartbeats
    pub fn heartbeating(&self) -> usize {
        self.heartbeats.len()
    }

    /// Number of services with at least one active subscription
    pub fn subscribed(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl NamingClient for HttpNamingClient {
    async fn register_instance(&self, param: RegisterInstanceParam) -> ClientResult<bool> {
        let metadata = serde_json::to_string(&param.metadata)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let form = vec![
            ("ip", param.ip.clone()),
            ("port", param.port.to_string()),
            ("namespaceId", self.namespace_id.clone()),
            ("weight", param.weight.to_string()),
            ("enabled", param.enabled.to_string()),
            ("healthy", param.healthy.to_string()),
            ("ephemeral", param.ephemeral.to_string()),
            ("metadata", metadata),
            ("clusterName", param.cluster_name.clone()),
            ("serviceName", param.service_name.clone()),
            ("groupName", param.group_name.clone()),
        ];
        let body = self
            .http
            .execute_ok(Method::POST, INSTANCE_PATH, &[], Some(form.as_slice()))
            .await?;
        if !acknowledged(&body) {
            return Ok(false);
        }

        tracing::info!(
            "Registered {}:{} as {}/{}",
            param.ip,
            param.port,
            param.group_name,
            param.service_name
        );
        if param.ephemeral {
            let key = BeatKey {
                service_name: param.service_name.clone(),
                group_name: param.group_name.clone(),
                cluster_name: param.cluster_name.clone(),
                ip: param.ip.clone(),
                port: param.port,
            };
            // Re-registration replaces the running heartbeat
            self.heartbeats.cancel(&key).await;
            let token = self.heartbeats.register(key, 0).await;
            self.spawn_heartbeat(param, token);
        }
        Ok(true)
    }

    async fn deregister_instance(&self, param: DeregisterInstanceParam) -> ClientResult<bool> {
        self.heartbeats
            .cancel(&BeatKey {
                service_name: param.service_name.clone(),
                group_name: param.group_name.clone(),
                cluster_name: param.cluster_name.clone(),
                ip: param.ip.clone(),
                port: param.port,
            })
            .await;

        let query = vec![
            ("ip", param.ip.clone()),
            ("port", param.port.to_string()),
            ("namespaceId", self.namespace_id.clone()),
            ("clusterName", param.cluster_name.clone()),
            ("serviceName", param.service_name.clone()),
            ("groupName", param.group_name.clone()),
            ("ephemeral", param.ephemeral.to_string()),
        ];
        let body = self
            .http
            .execute_ok(Method::DELETE, INSTANCE_PATH, &query, None)
            .await?;
        let accepted = acknowledged(&body);
        if accepted {
            tracing::info!(
                "Deregistered {}:{} from {}/{}",
                param.ip,
                param.port,
                param.group_name,
                param.service_name
            );
        }
        Ok(accepted)
    }

    async fn get_service(&self, param: &GetServiceParam) -> ClientResult<Service> {
        Self::list(&self.http, &self.namespace_id, param).await
    }

    async fn subscribe(
        &self,
        param: SubscribeParam,
        callback: SubscribeCallback,
    ) -> ClientResult<()> {
        let query = GetServiceParam {
            service_name: param.service_name.clone(),
            group_name: param.group_name.clone(),
            clusters: param.clusters.clone(),
        };
        let mut last = sorted_hosts(self.get_service(&query).await?.hosts);
        let token = self
            .subscriptions
            .register(param.clone(), callback_id(&callback))
            .await;

        let http = self.http.clone();
        let namespace_id = self.namespace_id.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let fetched = Self::list(&http, &namespace_id, &query).await;
                if token.is_cancelled() {
                    break;
                }
                match fetched {
                    Ok(service) => {
                        let hosts = sorted_hosts(service.hosts);
                        if hosts != last {
                            tracing::info!(
                                "Service {}/{} changed ({} hosts)",
                                query.group_name,
                                query.service_name,
                                hosts.len()
                            );
                            last = hosts.clone();
                            callback(Ok(ServiceChange {
                                service_name: query.service_name.clone(),
                                group_name: query.group_name.clone(),
                                hosts,
                            }));
                        }
                    }
                    Err(e) => callback(Err(e)),
                }
            }
            tracing::debug!(
                "Stopped polling service {}/{}",
                query.group_name,
                query.service_name
            );
        });

        Ok(())
    }

    async fn unsubscribe(
        &self,
        param: &SubscribeParam,
        callback: &SubscribeCallback,
    ) -> ClientResult<()> {
        if !self.subscriptions.cancel_one(param, callback_id(callback)).await {
            tracing::debug!(
                "No subscription registered for service {}/{}",
                param.group_name,
                param.service_name
            );
        }
        Ok(())
    }
}
