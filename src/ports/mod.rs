pub mod client;
pub mod config_client;
pub mod naming_client;
pub mod registry;
pub mod source;

pub use client::{ClientError, ClientResult};
pub use config_client::{ConfigChange, ConfigClient, ConfigListener, ConfigParam};
pub use naming_client::{
    DeregisterInstanceParam, GetServiceParam, Instance, NamingClient, RegisterInstanceParam,
    Service, ServiceChange, SubscribeCallback, SubscribeParam,
};
