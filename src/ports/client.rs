use thiserror::Error;

/// Error type for naming and configuration client operations
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ClientError {
    /// Error when the server cannot be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error when a call exceeds the configured timeout
    #[error("Timeout error after {0} ms")]
    Timeout(u64),

    /// Error when the server answers with a non-success status
    #[error("Server returned error status: {status}, url: {url}, body: {body}")]
    Status {
        /// The URL that was requested
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
        /// The response body, possibly truncated
        body: String,
    },

    /// Error when a response body cannot be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Error when the server accepted the call but refused the operation
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// Error when the client cannot be built from its options
    #[error("Client construction failed: {0}")]
    Build(String),

    /// Error when an operation targets a subscription or listener that is already gone
    #[error("Client closed: {0}")]
    Closed(String),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
