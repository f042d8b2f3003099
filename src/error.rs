use thiserror::Error;

use crate::ports::ClientError;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all adapter operations.
///
/// Every variant that wraps a client failure names the operation target, so the
/// caller can tell which document, service or endpoint failed. The adapter never retries.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The URL could not be parsed or did not yield a usable host and port
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// An option failed validation while assembling options
    #[error("Invalid option '{field}': {message}")]
    InvalidOption { field: String, message: String },

    /// The naming or configuration client could not be constructed
    #[error("Client initialization failed")]
    ClientInit(#[source] ClientError),

    /// Fetching a configuration document failed
    #[error("Failed to fetch config {group}/{data_id}")]
    ConfigFetch {
        data_id: String,
        group: String,
        #[source]
        source: ClientError,
    },

    /// Opening a listen or subscription failed
    #[error("Failed to subscribe to {target}")]
    Subscribe {
        target: String,
        #[source]
        source: ClientError,
    },

    /// Releasing a listen or subscription failed
    #[error("Failed to unsubscribe from {target}")]
    Unsubscribe {
        target: String,
        #[source]
        source: ClientError,
    },

    /// Registering one endpoint of a service failed
    #[error("Failed to register endpoint {endpoint} of service {service}")]
    Register {
        service: String,
        endpoint: String,
        #[source]
        source: ClientError,
    },

    /// Deregistering one endpoint of a service failed
    #[error("Failed to deregister endpoint {endpoint} of service {service}")]
    Deregister {
        service: String,
        endpoint: String,
        #[source]
        source: ClientError,
    },

    /// Querying the instances of a service failed
    #[error("Failed to fetch instances of service {service}")]
    Fetch {
        service: String,
        #[source]
        source: ClientError,
    },

    /// The watcher was stopped or its parent cancelled
    #[error("Watcher cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn invalid_option(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error reports an orderly end of a watch stream
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
