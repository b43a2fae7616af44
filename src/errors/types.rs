//! # Error Types
//!
//! Error taxonomy for the secret lifecycle engine using `thiserror`.

/// Custom result type for keyward operations
pub type Result<T> = std::result::Result<T, KeywardError>;

/// Main error type for the secret lifecycle engine
#[derive(thiserror::Error, Debug)]
pub enum KeywardError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Translation store errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Malformed or over-limit request fields, missing tenant headers
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Operation refused in the current resource state
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },

    /// Error reported by the key-material backend
    #[error("Keystore backend error: {message}")]
    Backend {
        message: String,
        status: Option<u16>,
    },

    /// Network transport errors (connection refused, timeouts)
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error reported by the metadata service
    #[error("Metadata service error: {message}")]
    Metadata {
        message: String,
        status: Option<u16>,
    },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl KeywardError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a keystore backend error
    pub fn backend<S: Into<String>>(message: S, status: Option<u16>) -> Self {
        Self::Backend { message: message.into(), status }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Create a metadata service error
    pub fn metadata<S: Into<String>>(message: S, status: Option<u16>) -> Self {
        Self::Metadata { message: message.into(), status }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Whether this error means the addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeywardError::NotFound { .. })
    }

    /// Whether this error is a state conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, KeywardError::Conflict { .. })
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            KeywardError::Config { .. } => 500,
            KeywardError::Database { .. } => 500,
            KeywardError::Serialization { .. } => 500,
            KeywardError::Validation { .. } => 400,
            KeywardError::NotFound { .. } => 404,
            KeywardError::Conflict { .. } => 409,
            KeywardError::Backend { status, .. } | KeywardError::Metadata { status, .. } => {
                match status {
                    Some(code @ 400..=499) => *code,
                    _ => 502,
                }
            }
            KeywardError::Transport { .. } => 503,
            KeywardError::Internal { .. } => 500,
        }
    }

    /// Check if this error should be retried.
    ///
    /// Transient I/O against the backend, the metadata service, or the
    /// translation store is retryable. Client-class failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            KeywardError::Database { .. } => true,
            KeywardError::Transport { .. } => true,
            KeywardError::Backend { status, .. } | KeywardError::Metadata { status, .. } => {
                !matches!(status, Some(400..=499))
            }
            _ => false,
        }
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for KeywardError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for KeywardError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<reqwest::Error> for KeywardError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport { message: error.to_string(), source: Some(Box::new(error)) }
    }
}

impl From<config::ConfigError> for KeywardError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for KeywardError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        match fields.first() {
            Some((field, _)) if fields.len() == 1 => {
                Self::validation_field(format!("Validation failed: {}", message), field.to_string())
            }
            _ => Self::validation(format!("Validation failed: {}", message)),
        }
    }
}
