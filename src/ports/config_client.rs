use std::sync::Arc;

use async_trait::async_trait;

use super::client::ClientResult;

/// Identifies one configuration document inside the client's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigParam {
    pub data_id: String,
    pub group: String,
}

impl ConfigParam {
    pub fn new(data_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            group: group.into(),
        }
    }
}

/// A change notification delivered to a [`ConfigListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub namespace: String,
    pub group: String,
    pub data_id: String,
    pub content: String,
}

/// Callback invoked by the client whenever a listened document changes.
///
/// Implementations run the listener on their own tasks; it must return quickly.
pub type ConfigListener = Arc<dyn Fn(ConfigChange) + Send + Sync>;

/// ConfigClient defines the port (interface) to the configuration half of the server
#[async_trait]
pub trait ConfigClient: Send + Sync + 'static {
    /// Fetch the raw content of a configuration document
    async fn get_config(&self, param: &ConfigParam) -> ClientResult<String>;

    /// Start delivering changes of a document to `listener`.
    ///
    /// Returns once the server has accepted the listen request.
    async fn listen_config(&self, param: ConfigParam, listener: ConfigListener)
    -> ClientResult<()>;

    /// Stop delivering changes of a document to `listener`.
    ///
    /// Other listeners of the same document keep receiving changes.
    async fn cancel_listen_config(
        &self,
        param: &ConfigParam,
        listener: &ConfigListener,
    ) -> ClientResult<()>;
}
