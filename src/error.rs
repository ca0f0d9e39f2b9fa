use thiserror::Error;

/// Errors raised by the indexing, serialization and query layers
#[derive(Error, Debug)]
pub enum EsError {
    /// Invalid settings or index configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A field the serializer cannot resolve
    #[error(
        "The serializer for {model} doesn't know how to handle `{field}`, \
         please register a `{hook}` hook"
    )]
    UnknownField {
        model: String,
        field: String,
        hook: String,
    },

    /// Lookup operator that is unknown or cannot be used in this position
    #[error("Unsupported lookup: {0}")]
    UnsupportedLookup(String),

    /// Document missing from the index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Search cluster unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Search cluster answered with an error status
    #[error("Transport error ({status}): {message}")]
    Transport { status: u16, message: String },

    /// Save or delete attempted on a record rebuilt from the search index
    #[error("Unsafe write: {0}")]
    UnsafeWrite(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected response shape from the search cluster
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EsError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            EsError::Configuration(_) => "CONFIGURATION_ERROR",
            EsError::UnknownField { .. } => "UNKNOWN_FIELD",
            EsError::UnsupportedLookup(_) => "UNSUPPORTED_LOOKUP",
            EsError::NotFound(_) => "NOT_FOUND",
            EsError::Connection(_) => "CONNECTION_ERROR",
            EsError::Transport { .. } => "TRANSPORT_ERROR",
            EsError::UnsafeWrite(_) => "UNSAFE_WRITE",
            EsError::Serialization(_) => "SERIALIZATION_ERROR",
            EsError::InvalidResponse(_) => "INVALID_RESPONSE",
            EsError::Io(_) => "IO_ERROR",
        }
    }

    /// True when the cluster could not serve the request.
    ///
    /// Callers that keep a degraded path (querying the primary store directly)
    /// branch on this; the query layer itself never retries.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, EsError::Connection(_) | EsError::Transport { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EsError::NotFound(_))
    }

    /// HTTP status carried by a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            EsError::Transport { status, .. } => Some(*status),
            EsError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EsError {
    fn from(err: serde_json::Error) -> Self {
        EsError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for EsError {
    fn from(err: config::ConfigError) -> Self {
        EsError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EsError {
    fn from(err: validator::ValidationErrors) -> Self {
        EsError::Configuration(err.to_string())
    }
}

impl From<reqwest::Error> for EsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            EsError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            EsError::Transport {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            EsError::InvalidResponse(err.to_string())
        } else {
            EsError::Connection(err.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EsError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            EsError::UnsupportedLookup("range".to_string()).error_code(),
            "UNSUPPORTED_LOOKUP"
        );
        assert_eq!(
            EsError::UnsafeWrite("x".to_string()).error_code(),
            "UNSAFE_WRITE"
        );
    }

    #[test]
    fn test_transport_failures() {
        assert!(EsError::Connection("refused".to_string()).is_transport_failure());
        assert!(EsError::Transport {
            status: 500,
            message: "boom".to_string()
        }
        .is_transport_failure());
        assert!(!EsError::NotFound("1".to_string()).is_transport_failure());
        assert!(!EsError::Configuration("bad".to_string()).is_transport_failure());
    }

    #[test]
    fn test_unknown_field_message_names_hook() {
        let err = EsError::UnknownField {
            model: "Article".to_string(),
            field: "foo".to_string(),
            hook: "serialize_foo".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("`foo`"));
        assert!(message.contains("serialize_foo"));
    }
}
