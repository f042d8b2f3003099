use std::{sync::Arc, time::Duration};

use super::nacos_http::{HttpConfigClient, HttpNamingClient};
use crate::{
    config::ClientOptions,
    ports::{ClientResult, ConfigClient, NamingClient},
};

/// Builds the upstream clients an adapter talks through.
///
/// Implement this to plug a different SDK behind the adapters.
pub trait ClientFactory: Send + Sync + 'static {
    fn config_client(&self, options: &ClientOptions) -> ClientResult<Arc<dyn ConfigClient>>;

    fn naming_client(
        &self,
        options: &ClientOptions,
        heartbeat_interval: Duration,
    ) -> ClientResult<Arc<dyn NamingClient>>;
}

/// Default factory producing the HTTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn config_client(&self, options: &ClientOptions) -> ClientResult<Arc<dyn ConfigClient>> {
        Ok(Arc::new(HttpConfigClient::new(options)?))
    }

    fn naming_client(
        &self,
        options: &ClientOptions,
        heartbeat_interval: Duration,
    ) -> ClientResult<Arc<dyn NamingClient>> {
        Ok(Arc::new(HttpNamingClient::new(options, heartbeat_interval)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ClientError;

    #[test]
    fn test_http_factory_builds_both_clients() {
        let options = ClientOptions::new("http://127.0.0.1:8848", "ns1");
        let factory = HttpClientFactory;
        assert!(factory.config_client(&options).is_ok());
        assert!(
            factory
                .naming_client(&options, Duration::from_secs(5))
                .is_ok()
        );
    }

    #[test]
    fn test_http_factory_rejects_unusable_endpoint() {
        let options = ClientOptions::new("not a url", "ns1");
        let err = HttpClientFactory.config_client(&options).err();
        assert!(matches!(err, Some(ClientError::Build(_))));
    }
}
