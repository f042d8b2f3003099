use crate::{
    config::models::{ClientOptions, ConfigOptions, RegistryOptions},
    core::Endpoint,
    error::Error,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingField { field } => Error::InvalidOption {
                field,
                message: "field is required".to_string(),
            },
            ValidationError::InvalidField { field, message } => {
                Error::InvalidOption { field, message }
            }
            ValidationError::InvalidEndpoint { endpoint, reason } => {
                Error::InvalidEndpoint { endpoint, reason }
            }
        }
    }
}

/// Validator for assembled option records.
///
/// Reports the first problem found; fields are checked in declaration order.
pub struct OptionsValidator;

impl OptionsValidator {
    pub fn validate_config(options: &ConfigOptions) -> ValidationResult<()> {
        Self::validate_client(&options.client)?;
        Self::require("data_id", &options.data_id)?;
        Self::validate_capacity(options.watch_capacity)?;
        Ok(())
    }

    pub fn validate_registry(options: &RegistryOptions) -> ValidationResult<()> {
        Self::validate_client(&options.client)?;
        Self::require("cluster", &options.cluster)?;

        if !options.weight.is_finite() || options.weight < 0.0 {
            return Err(ValidationError::InvalidField {
                field: "weight".to_string(),
                message: format!("{} is not a finite, non-negative weight", options.weight),
            });
        }

        if let Some(scheme) = options.skip_schemes.iter().find(|s| s.trim().is_empty()) {
            return Err(ValidationError::InvalidField {
                field: "skip_schemes".to_string(),
                message: format!("'{scheme}' is not a scheme"),
            });
        }

        Self::validate_capacity(options.watch_capacity)?;
        Self::positive("heartbeat_interval_ms", options.heartbeat_interval_ms)?;
        Ok(())
    }

    fn validate_client(options: &ClientOptions) -> ValidationResult<()> {
        Self::require("endpoint", &options.endpoint)?;
        Endpoint::parse(&options.endpoint).map_err(|e| match e {
            Error::InvalidEndpoint { endpoint, reason } => {
                ValidationError::InvalidEndpoint { endpoint, reason }
            }
            other => ValidationError::InvalidField {
                field: "endpoint".to_string(),
                message: other.to_string(),
            },
        })?;

        Self::require("namespace_id", &options.namespace_id)?;
        Self::require("group", &options.group)?;
        Self::positive("timeout_ms", options.timeout_ms)?;
        Self::positive("poll_interval_ms", options.poll_interval_ms)?;

        if options.context_path.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidField {
                field: "context_path".to_string(),
                message: "must not contain whitespace".to_string(),
            });
        }
        Ok(())
    }

    fn require(field: &str, value: &str) -> ValidationResult<()> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn positive(field: &str, value: u64) -> ValidationResult<()> {
        if value == 0 {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn validate_capacity(capacity: usize) -> ValidationResult<()> {
        if capacity == 0 {
            return Err(ValidationError::InvalidField {
                field: "watch_capacity".to_string(),
                message: "watchers need room for at least one snapshot".to_string(),
            });
        }
        Ok(())
    }
}
