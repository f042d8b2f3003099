//! Clients speaking the Nacos v1 open API over plain HTTP.
//!
//! These are thin: every port call maps to one HTTP request, and listeners and
//! subscriptions are served by polling tasks that fire their callback when the
//! observed state changes.

pub mod config;
pub mod naming;

use std::{hash::Hash, sync::Arc};

use reqwest::{Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;

pub use config::HttpConfigClient;
pub use naming::HttpNamingClient;

use crate::{
    config::ClientOptions,
    ports::{ClientError, ClientResult},
};

/// Longest response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Shared request plumbing of both clients
#[derive(Clone)]
pub(crate) struct NacosHttp {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl NacosHttp {
    pub(crate) fn new(options: &ClientOptions) -> ClientResult<Self> {
        let server = options
            .server()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let client = Client::builder()
            .timeout(options.timeout())
            .user_agent(concat!("nacos-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        if options.log_dir.is_some() || options.cache_dir.is_some() {
            tracing::debug!(
                "HTTP client keeps no disk cache or own log files; log_dir={:?} cache_dir={:?}",
                options.log_dir,
                options.cache_dir
            );
        }

        Ok(Self {
            client,
            base_url: format!("{}/{}", server.http_base(), options.context_path),
            timeout_ms: options.timeout_ms,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request and return its status and body, whatever the status
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: Option<&[(&str, String)]>,
    ) -> ClientResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url).query(query);
        if let Some(form) = form {
            request = request.form(form);
        }

        tracing::trace!("{} {}", method, url);
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_error(e))?;
        Ok((status, body))
    }

    /// Send one request and fail on any non-success status
    pub(crate) async fn execute_ok(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: Option<&[(&str, String)]>,
    ) -> ClientResult<String> {
        let (status, body) = self.execute(method, path, query, form).await?;
        if !status.is_success() {
            return Err(self.status_error(path, status, &body));
        }
        Ok(body)
    }

    pub(crate) fn status_error(&self, path: &str, status: StatusCode, body: &str) -> ClientError {
        let mut body = body.trim().to_string();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        ClientError::Status {
            url: format!("{}{}", self.base_url, path),
            status: status.as_u16(),
            body,
        }
    }

    fn map_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout_ms)
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

/// Identity of a shared callback, stable while the callback is alive
pub(crate) fn callback_id<T: ?Sized>(callback: &Arc<T>) -> usize {
    Arc::as_ptr(callback).cast::<()>() as usize
}

/// Cancellation tokens of background polling tasks, grouped by key.
///
/// Several tasks may share a key, each tagged with the id of the callback it feeds.
/// A task holds its callback until cancelled, so ids under one key stay distinct.
pub(crate) struct PollTasks<K> {
    tasks: scc::HashMap<K, Vec<(usize, CancellationToken)>>,
    root: CancellationToken,
}

impl<K> PollTasks<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            tasks: scc::HashMap::new(),
            root: CancellationToken::new(),
        }
    }

    /// Reserve a token for a new task under `key`
    pub(crate) async fn register(&self, key: K, id: usize) -> CancellationToken {
        let token = self.root.child_token();
        self.tasks
            .entry_async(key)
            .await
            .or_default()
            .get_mut()
            .push((id, token.clone()));
        token
    }

    /// Stop every task under `key`; returns whether any was running
    pub(crate) async fn cancel(&self, key: &K) -> bool {
        match self.tasks.remove_async(key).await {
            Some((_, tokens)) => {
                tokens.iter().for_each(|(_, token)| token.cancel());
                true
            }
            None => false,
        }
    }

    /// Stop only the task under `key` tagged `id`; returns whether it was running
    pub(crate) async fn cancel_one(&self, key: &K, id: usize) -> bool {
        let mut found = false;
        self.tasks
            .remove_if_async(key, |tokens| {
                if let Some(at) = tokens.iter().position(|(task, _)| *task == id) {
                    tokens.swap_remove(at).1.cancel();
                    found = true;
                }
                tokens.is_empty()
            })
            .await;
        found
    }

    /// Number of keys with at least one running task
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl<K> Drop for PollTasks<K> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_one_leaves_siblings_running() {
        let tasks = PollTasks::new();
        let first = tasks.register("svc", 1).await;
        let second = tasks.register("svc", 2).await;
        assert_eq!(tasks.len(), 1);

        assert!(tasks.cancel_one(&"svc", 1).await);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(tasks.len(), 1);

        assert!(!tasks.cancel_one(&"svc", 1).await);
        assert!(tasks.cancel_one(&"svc", 2).await);
        assert!(second.is_cancelled());
        assert_eq!(tasks.len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_every_task_under_key() {
        let tasks = PollTasks::new();
        let first = tasks.register("beat", 0).await;
        let second = tasks.register("beat", 0).await;

        assert!(tasks.cancel(&"beat").await);
        assert!(first.is_cancelled() && second.is_cancelled());
        assert!(!tasks.cancel(&"beat").await);
    }

    #[test]
    fn test_callback_id_follows_the_shared_allocation() {
        let callback: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        let other: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        assert_eq!(callback_id(&callback), callback_id(&callback.clone()));
        assert_ne!(callback_id(&callback), callback_id(&other));
    }
}
