use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::client_factory::{ClientFactory, HttpClientFactory};
use crate::{
    config::RegistryOptions,
    core::{
        Endpoint, ServiceInstance, ServiceWatcher, SnapshotQueue, UnsubscribeFn, WatchCore,
        instance::{instances_from_hosts, plain_service_name, prime_hosts},
    },
    error::{Error, Result},
    ports::{
        ClientError, DeregisterInstanceParam, GetServiceParam, NamingClient,
        RegisterInstanceParam, ServiceChange, SubscribeCallback, SubscribeParam,
        registry::{Discovery, Registrar},
    },
    tracing_setup,
};

/// Service registry and discovery backed by the naming service.
///
/// The naming client is built when the registry is constructed and shared by every
/// watcher it opens.
pub struct NacosRegistry {
    options: RegistryOptions,
    client: Arc<dyn NamingClient>,
    shutdown: CancellationToken,
}

impl NacosRegistry {
    pub fn new(options: RegistryOptions) -> Result<Self> {
        Self::with_factory(options, &HttpClientFactory)
    }

    pub fn with_factory(options: RegistryOptions, factory: &dyn ClientFactory) -> Result<Self> {
        let client = factory
            .naming_client(&options.client, options.heartbeat_interval())
            .map_err(Error::ClientInit)?;
        Ok(Self::with_client(options, client))
    }

    /// Use an already constructed client
    pub fn with_client(options: RegistryOptions, client: Arc<dyn NamingClient>) -> Self {
        Self {
            options,
            client,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie every watcher opened through [`NacosRegistry::watch`] to `parent`
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// End every watcher opened through [`NacosRegistry::watch`]
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn group(&self) -> String {
        self.options.group().to_string()
    }

    fn register_param(
        &self,
        service: &ServiceInstance,
        endpoint: &Endpoint,
    ) -> RegisterInstanceParam {
        RegisterInstanceParam {
            ip: endpoint.host.clone(),
            port: endpoint.port,
            weight: self.options.weight,
            enabled: true,
            healthy: self.options.healthy,
            ephemeral: true,
            metadata: service.registration_metadata(&endpoint.scheme),
            cluster_name: self.options.cluster.clone(),
            service_name: service.name.clone(),
            group_name: self.group(),
        }
    }

    /// Register one server instance per endpoint of `service`.
    ///
    /// Endpoints are registered in order and the first failure aborts the call.
    /// Endpoints registered before the failure stay registered.
    pub async fn register(&self, service: &ServiceInstance) -> Result<()> {
        let mut registered = 0usize;
        for raw in &service.endpoints {
            let endpoint = Endpoint::parse(raw)?;
            if self.options.skips_scheme(&endpoint.scheme) {
                tracing::debug!(
                    "Skipping {} endpoint {} of service {}",
                    endpoint.scheme,
                    raw,
                    service.name
                );
                continue;
            }

            let param = self.register_param(service, &endpoint);
            let accepted = self
                .client
                .register_instance(param)
                .instrument(tracing_setup::create_client_span("register_instance", raw))
                .await;
            let source = match accepted {
                Ok(true) => {
                    registered += 1;
                    continue;
                }
                Ok(false) => ClientError::Rejected("server refused the registration".to_string()),
                Err(e) => e,
            };
            return Err(Error::Register {
                service: service.name.clone(),
                endpoint: raw.clone(),
                source,
            });
        }

        if registered == 0 {
            tracing::warn!(
                "Service {} has no registrable endpoints ({} given)",
                service.name,
                service.endpoints.len()
            );
        } else {
            tracing::info!(
                "Registered {} endpoint(s) of service {} (id {})",
                registered,
                service.name,
                service.id
            );
        }
        Ok(())
    }

    /// Deregister every endpoint of `service`, mirroring [`NacosRegistry::register`]
    pub async fn deregister(&self, service: &ServiceInstance) -> Result<()> {
        for raw in &service.endpoints {
            let endpoint = Endpoint::parse(raw)?;
            if self.options.skips_scheme(&endpoint.scheme) {
                continue;
            }

            let param = DeregisterInstanceParam {
                ip: endpoint.host.clone(),
                port: endpoint.port,
                cluster_name: self.options.cluster.clone(),
                service_name: service.name.clone(),
                group_name: self.group(),
                ephemeral: true,
            };
            let accepted = self
                .client
                .deregister_instance(param)
                .instrument(tracing_setup::create_client_span("deregister_instance", raw))
                .await;
            let source = match accepted {
                Ok(true) => continue,
                Ok(false) => {
                    ClientError::Rejected("server refused the deregistration".to_string())
                }
                Err(e) => e,
            };
            return Err(Error::Deregister {
                service: service.name.clone(),
                endpoint: raw.clone(),
                source,
            });
        }

        tracing::info!("Deregistered service {} (id {})", service.name, service.id);
        Ok(())
    }

    fn lookup(&self, name: &str) -> GetServiceParam {
        GetServiceParam {
            service_name: name.to_string(),
            group_name: self.group(),
            clusters: self.options.clusters.clone(),
        }
    }

    /// Current instances of the named service
    pub async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let service = self
            .client
            .get_service(&self.lookup(name))
            .instrument(tracing_setup::create_client_span("get_service", name))
            .await
            .map_err(|source| Error::Fetch {
                service: name.to_string(),
                source,
            })?;
        Ok(instances_from_hosts(&service.hosts, name))
    }

    /// Alias of [`NacosRegistry::get_service`]
    pub async fn fetch(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        self.get_service(name).await
    }

    /// Watch the named service until the registry shuts down
    pub async fn watch(&self, name: &str) -> Result<ServiceWatcher> {
        self.watch_with(&self.shutdown, name).await
    }

    /// Watch the named service until `parent` is cancelled or the watcher is stopped.
    ///
    /// The first snapshot is the current instance list, unless a push arrived first.
    pub async fn watch_with(
        &self,
        parent: &CancellationToken,
        name: &str,
    ) -> Result<ServiceWatcher> {
        let group = self.group();
        let param = SubscribeParam {
            service_name: name.to_string(),
            group_name: group.clone(),
            clusters: self.options.clusters.clone(),
        };
        let target = format!("service {group}/{name}");

        let queue = Arc::new(SnapshotQueue::new(self.options.watch_capacity));
        let producer = queue.clone();
        let (service_name, group_name) = (name.to_string(), group);
        let callback: SubscribeCallback =
            Arc::new(move |delivery: std::result::Result<ServiceChange, ClientError>| {
                match delivery {
                    Ok(change) => {
                        if plain_service_name(&change.service_name) != service_name
                            || change.group_name != group_name
                        {
                            tracing::debug!(
                                "Ignoring push for service {}/{}",
                                change.group_name,
                                change.service_name
                            );
                            return;
                        }
                        producer.push(change.hosts);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Subscription to service {}/{} reported an error: {}",
                            group_name,
                            service_name,
                            e
                        );
                    }
                }
            });

        // Releases only this watcher's subscription; other watchers of the service keep theirs
        let unsubscribe: UnsubscribeFn = {
            let client = self.client.clone();
            let param = param.clone();
            let callback = callback.clone();
            Arc::new(move || {
                let client = client.clone();
                let param = param.clone();
                let callback = callback.clone();
                async move { client.unsubscribe(&param, &callback).await }.boxed()
            })
        };
        let core = WatchCore::with_queue(parent, queue, target.clone(), unsubscribe);

        let accepted = self
            .client
            .subscribe(param, callback)
            .instrument(tracing_setup::create_watch_span("service", &target))
            .await;
        if let Err(source) = accepted {
            core.abort();
            return Err(Error::Subscribe { target, source });
        }
        core.activate();

        // Prime with the current list so the first next() does not wait for a change
        match self.client.get_service(&self.lookup(name)).await {
            Ok(service) => {
                let hosts = prime_hosts(service.hosts, name, self.options.weight);
                if !core.producer().push_if_empty(hosts) {
                    tracing::debug!("Push for {} arrived before priming, keeping it", target);
                }
            }
            Err(source) => {
                if let Err(e) = core.stop().await {
                    tracing::warn!("Failed to release {} after priming failed: {}", target, e);
                }
                return Err(Error::Fetch {
                    service: name.to_string(),
                    source,
                });
            }
        }

        tracing::info!("Watching {}", target);
        Ok(ServiceWatcher::new(core, name))
    }
}

#[async_trait]
impl Registrar for NacosRegistry {
    async fn register(&self, service: &ServiceInstance) -> Result<()> {
        NacosRegistry::register(self, service).await
    }

    async fn deregister(&self, service: &ServiceInstance) -> Result<()> {
        NacosRegistry::deregister(self, service).await
    }
}

#[async_trait]
impl Discovery for NacosRegistry {
    type Watcher = ServiceWatcher;

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        NacosRegistry::get_service(self, name).await
    }

    async fn watch(&self, parent: &CancellationToken, name: &str) -> Result<ServiceWatcher> {
        self.watch_with(parent, name).await
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;
    use crate::ports::{ClientResult, Instance, Service};

    /// Records calls; the registration at `fail_at` (0-based) fails
    #[derive(Default)]
    struct RecordingClient {
        registered: Mutex<Vec<RegisterInstanceParam>>,
        deregistered: Mutex<Vec<DeregisterInstanceParam>>,
        fail_at: Option<usize>,
        refuse: bool,
    }

    #[async_trait]
    impl NamingClient for RecordingClient {
        async fn register_instance(&self, param: RegisterInstanceParam) -> ClientResult<bool> {
            let mut registered = self.registered.lock().unwrap();
            if self.fail_at == Some(registered.len()) {
                return Err(ClientError::Connection("down".to_string()));
            }
            registered.push(param);
            Ok(!self.refuse)
        }

        async fn deregister_instance(&self, param: DeregisterInstanceParam) -> ClientResult<bool> {
            self.deregistered.lock().unwrap().push(param);
            Ok(true)
        }

        async fn get_service(&self, param: &GetServiceParam) -> ClientResult<Service> {
            Ok(Service {
                name: format!("{}@@{}", param.group_name, param.service_name),
                hosts: vec![Instance {
                    instance_id: "10.0.0.2#9000".to_string(),
                    ip: "10.0.0.2".to_string(),
                    port: 9000,
                    metadata: HashMap::from([("scheme".to_string(), "grpc".to_string())]),
                    ..Default::default()
                }],
            })
        }

        async fn subscribe(
            &self,
            _param: SubscribeParam,
            _callback: SubscribeCallback,
        ) -> ClientResult<()> {
            Ok(())
        }

        async fn unsubscribe(
            &self,
            _param: &SubscribeParam,
            _callback: &SubscribeCallback,
        ) -> ClientResult<()> {
            Ok(())
        }
    }

    fn options() -> RegistryOptions {
        RegistryOptions::builder("http://127.0.0.1:8848", "ns1")
            .group("G")
            .cluster("BLUE")
            .weight(10.0)
            .skip_scheme("http")
            .build()
            .unwrap()
    }

    fn instance(endpoints: &[&str]) -> ServiceInstance {
        ServiceInstance {
            id: "i1".to_string(),
            name: "svc".to_string(),
            version: "v1".to_string(),
            metadata: HashMap::new(),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_register_maps_each_endpoint() {
        let client = Arc::new(RecordingClient::default());
        let registry = NacosRegistry::with_client(options(), client.clone());

        registry
            .register(&instance(&["grpc://10.0.0.2:9000", "https://[::1]"]))
            .await
            .unwrap();

        let registered = client.registered.lock().unwrap();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].ip, "10.0.0.2");
        assert_eq!(registered[0].port, 9000);
        assert_eq!(registered[0].metadata["scheme"], "grpc");
        assert_eq!(registered[0].cluster_name, "BLUE");
        assert_eq!(registered[0].group_name, "G");
        assert_eq!(registered[0].weight, 10.0);
        assert!(registered[0].healthy && registered[0].enabled && registered[0].ephemeral);
        assert_eq!(registered[1].ip, "::1");
        assert_eq!(registered[1].port, 443);
    }

    #[tokio::test]
    async fn test_register_skips_configured_schemes() {
        let client = Arc::new(RecordingClient::default());
        let registry = NacosRegistry::with_client(options(), client.clone());

        registry
            .register(&instance(&["http://10.0.0.2:8000"]))
            .await
            .unwrap();
        assert!(client.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_failure_names_endpoint_without_rollback() {
        let client = Arc::new(RecordingClient {
            fail_at: Some(1),
            ..Default::default()
        });
        let registry = NacosRegistry::with_client(options(), client.clone());

        let err = registry
            .register(&instance(&["grpc://10.0.0.2:9000", "grpc://10.0.0.3:9000"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Register { ref endpoint, .. } if endpoint == "grpc://10.0.0.3:9000"
        ));
        assert_eq!(client.registered.lock().unwrap().len(), 1);
        assert!(client.deregistered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refused_registration_is_an_error() {
        let client = Arc::new(RecordingClient {
            refuse: true,
            ..Default::default()
        });
        let registry = NacosRegistry::with_client(options(), client);

        let err = registry
            .register(&instance(&["grpc://10.0.0.2:9000"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Register {
                source: ClientError::Rejected(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_rejected() {
        let registry =
            NacosRegistry::with_client(options(), Arc::new(RecordingClient::default()));
        let err = registry.register(&instance(&["::not a url"])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn test_deregister_mirrors_register() {
        let client = Arc::new(RecordingClient::default());
        let registry = NacosRegistry::with_client(options(), client.clone());

        registry
            .deregister(&instance(&["grpc://10.0.0.2:9000", "http://10.0.0.2:8000"]))
            .await
            .unwrap();
        let deregistered = client.deregistered.lock().unwrap();
        assert_eq!(deregistered.len(), 1);
        assert_eq!(deregistered[0].port, 9000);
        assert_eq!(deregistered[0].cluster_name, "BLUE");
    }

    #[tokio::test]
    async fn test_get_service_translates_hosts() {
        let registry =
            NacosRegistry::with_client(options(), Arc::new(RecordingClient::default()));
        let instances = registry.fetch("svc").await.unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "10.0.0.2#9000");
        assert_eq!(instances[0].name, "svc");
        assert_eq!(instances[0].endpoints, vec!["grpc://10.0.0.2:9000"]);
    }

    #[tokio::test]
    async fn test_watch_is_primed_with_current_instances() {
        let registry =
            NacosRegistry::with_client(options(), Arc::new(RecordingClient::default()));
        let mut watcher = registry.watch("svc").await.unwrap();

        let instances = watcher.next().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].metadata["name"], "svc");

        registry.shutdown();
        assert!(watcher.next().await.unwrap_err().is_cancelled());
    }
}
