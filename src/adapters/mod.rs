pub mod client_factory;
pub mod nacos_http;
pub mod registry;
pub mod source;

/// Re-export commonly used types from adapters
pub use client_factory::{ClientFactory, HttpClientFactory};
pub use nacos_http::{HttpConfigClient, HttpNamingClient};
pub use registry::NacosRegistry;
pub use source::NacosSource;
