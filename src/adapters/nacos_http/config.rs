use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tokio::time::MissedTickBehavior;

use super::{NacosHttp, PollTasks, callback_id};
use crate::{
    config::ClientOptions,
    ports::{ClientResult, ConfigChange, ConfigClient, ConfigListener, ConfigParam},
};

const CONFIGS_PATH: &str = "/v1/cs/configs";

/// Configuration client that fetches documents over HTTP and polls for changes.
pub struct HttpConfigClient {
    http: NacosHttp,
    namespace_id: String,
    poll_interval: Duration,
    listeners: PollTasks<ConfigParam>,
}

impl HttpConfigClient {
    pub fn new(options: &ClientOptions) -> ClientResult<Self> {
        let http = NacosHttp::new(options)?;
        tracing::info!(
            "Created config client for {} (namespace '{}')",
            http.base_url(),
            options.namespace_id
        );
        Ok(Self {
            http,
            namespace_id: options.namespace_id.clone(),
            poll_interval: options.poll_interval(),
            listeners: PollTasks::new(),
        })
    }

    async fn fetch(
        http: &NacosHttp,
        namespace_id: &str,
        param: &ConfigParam,
    ) -> ClientResult<String> {
        let mut query = vec![
            ("dataId", param.data_id.clone()),
            ("group", param.group.clone()),
        ];
        if !namespace_id.is_empty() {
            query.push(("tenant", namespace_id.to_string()));
        }

        let (status, body) = http.execute(Method::GET, CONFIGS_PATH, &query, None).await?;
        match status {
            s if s.is_success() => Ok(body),
            // A document that was never published reads as empty
            StatusCode::NOT_FOUND => Ok(String::new()),
            s => Err(http.status_error(CONFIGS_PATH, s, &body)),
        }
    }

    /// Number of documents with at least one active listener
    pub fn listened(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl ConfigClient for HttpConfigClient {
    async fn get_config(&self, param: &ConfigParam) -> ClientResult<String> {
        Self::fetch(&self.http, &self.namespace_id, param).await
    }

    async fn listen_config(
        &self,
        param: ConfigParam,
        listener: ConfigListener,
    ) -> ClientResult<()> {
        // The baseline both proves the server reachable and suppresses a spurious first change
        let mut last = self.get_config(&param).await?;
        let token = self
            .listeners
            .register(param.clone(), callback_id(&listener))
            .await;

        let http = self.http.clone();
        let namespace_id = self.namespace_id.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and the baseline is already known
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let fetched = Self::fetch(&http, &namespace_id, &param).await;
                if token.is_cancelled() {
                    break;
                }
                match fetched {
                    Ok(content) if content != last => {
                        tracing::info!(
                            "Config {}/{} changed ({} bytes)",
                            param.group,
                            param.data_id,
                            content.len()
                        );
                        last = content.clone();
                        listener(ConfigChange {
                            namespace: namespace_id.clone(),
                            group: param.group.clone(),
                            data_id: param.data_id.clone(),
                            content,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            "Failed to poll config {}/{}: {}",
                            param.group,
                            param.data_id,
                            e
                        );
                    }
                }
            }
            tracing::debug!("Stopped polling config {}/{}", param.group, param.data_id);
        });

        Ok(())
    }

    async fn cancel_listen_config(
        &self,
        param: &ConfigParam,
        listener: &ConfigListener,
    ) -> ClientResult<()> {
        if !self.listeners.cancel_one(param, callback_id(listener)).await {
            tracing::debug!(
                "No listener registered for config {}/{}",
                param.group,
                param.data_id
            );
        }
        Ok(())
    }
}
