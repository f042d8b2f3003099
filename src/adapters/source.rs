use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::client_factory::{ClientFactory, HttpClientFactory};
use crate::{
    config::ConfigOptions,
    core::{ConfigWatcher, KeyValue, SnapshotQueue, UnsubscribeFn, WatchCore},
    error::{Error, Result},
    ports::{ConfigChange, ConfigClient, ConfigListener, ConfigParam, source::Source},
    tracing_setup,
};

/// Configuration source reading one document from the server.
///
/// The config client is built on first use and shared by every watcher of this source.
pub struct NacosSource {
    options: ConfigOptions,
    factory: Arc<dyn ClientFactory>,
    client: OnceCell<Arc<dyn ConfigClient>>,
    shutdown: CancellationToken,
}

impl NacosSource {
    pub fn new(options: ConfigOptions) -> Self {
        Self::with_factory(options, Arc::new(HttpClientFactory))
    }

    pub fn with_factory(options: ConfigOptions, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            options,
            factory,
            client: OnceCell::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an already constructed client
    pub fn with_client(options: ConfigOptions, client: Arc<dyn ConfigClient>) -> Self {
        Self {
            options,
            factory: Arc::new(HttpClientFactory),
            client: OnceCell::from(client),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie every watcher of this source to `parent`
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    fn param(&self) -> ConfigParam {
        ConfigParam::new(self.options.data_id.clone(), self.options.group())
    }

    async fn client(&self) -> Result<Arc<dyn ConfigClient>> {
        self.client
            .get_or_try_init(|| async {
                tracing::debug!(
                    "Creating config client for {}",
                    self.options.client.endpoint
                );
                self.factory
                    .config_client(&self.options.client)
                    .map_err(Error::ClientInit)
            })
            .await
            .cloned()
    }

    /// Fetch the current content of the document
    pub async fn load(&self) -> Result<Vec<KeyValue>> {
        let client = self.client().await?;
        let param = self.param();
        let content = client
            .get_config(&param)
            .instrument(tracing_setup::create_client_span(
                "get_config",
                &format!("{}/{}", param.group, param.data_id),
            ))
            .await
            .map_err(|source| Error::ConfigFetch {
                data_id: param.data_id.clone(),
                group: param.group.clone(),
                source,
            })?;

        tracing::debug!(
            "Loaded config {}/{} ({} bytes)",
            param.group,
            param.data_id,
            content.len()
        );
        Ok(vec![KeyValue::new(param.data_id, content)])
    }

    /// Start watching the document.
    ///
    /// Returns once the server accepted the listener. Every later version is delivered
    /// through the returned watcher; the current version is not.
    pub async fn watch(&self) -> Result<ConfigWatcher> {
        let client = self.client().await?;
        let param = self.param();
        let target = format!("config {}/{}", param.group, param.data_id);

        let queue = Arc::new(SnapshotQueue::new(self.options.watch_capacity));
        let producer = queue.clone();
        let (data_id, group) = (param.data_id.clone(), param.group.clone());
        let listener: ConfigListener = Arc::new(move |change: ConfigChange| {
            if change.data_id != data_id || change.group != group {
                tracing::debug!(
                    "Ignoring change of config {}/{}",
                    change.group,
                    change.data_id
                );
                return;
            }
            producer.push(change.content);
        });

        // Releases only this watcher's listener; other watchers of the document keep theirs
        let unsubscribe: UnsubscribeFn = {
            let client = client.clone();
            let param = param.clone();
            let listener = listener.clone();
            Arc::new(move || {
                let client = client.clone();
                let param = param.clone();
                let listener = listener.clone();
                async move { client.cancel_listen_config(&param, &listener).await }.boxed()
            })
        };
        let core = WatchCore::with_queue(&self.shutdown, queue, target.clone(), unsubscribe);

        let accepted = client
            .listen_config(param.clone(), listener)
            .instrument(tracing_setup::create_watch_span("config", &target))
            .await;
        if let Err(source) = accepted {
            core.abort();
            return Err(Error::Subscribe { target, source });
        }
        core.activate();
        tracing::info!("Watching {}", target);

        Ok(ConfigWatcher::new(core, param.data_id))
    }
}

#[async_trait]
impl Source for NacosSource {
    type Watcher = ConfigWatcher;

    async fn load(&self) -> Result<Vec<KeyValue>> {
        NacosSource::load(self).await
    }

    async fn watch(&self) -> Result<ConfigWatcher> {
        NacosSource::watch(self).await
    }
}
