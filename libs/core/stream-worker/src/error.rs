//! Stream error types and error categorization
//!
//! Errors are categorized to determine delivery behavior:
//! - **Transient**: the message stays pending and is redelivered
//! - **Permanent**: the message moves to the DLQ immediately

use thiserror::Error;

/// Category of error for determining redelivery behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure. The message is left un-acked so the claim
    /// cycle redelivers it after the visibility timeout.
    Transient,
    /// Unrecoverable error. The message moves to the DLQ immediately.
    Permanent,
}

impl ErrorCategory {
    /// Whether messages failing with this category should be redelivered.
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

/// Stream processing errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job processing failed
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Redis(_) => ErrorCategory::Transient,
            StreamError::Serialization(_) => ErrorCategory::Permanent,
            StreamError::Processing { category, .. } => *category,
            StreamError::Config(_) => ErrorCategory::Permanent,
            StreamError::Internal(_) => ErrorCategory::Permanent,
        }
    }

    /// Check if the error is a missing consumer group (NOGROUP)
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Check if the error is a Redis connection failure
    pub fn is_connection_error(&self) -> bool {
        match self {
            StreamError::Redis(e) => {
                e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(ErrorCategory::Transient.should_retry());
        assert!(!ErrorCategory::Permanent.should_retry());
    }

    #[test]
    fn test_processing_error_category() {
        let transient = StreamError::transient("redis hiccup");
        assert_eq!(transient.category(), ErrorCategory::Transient);

        let permanent = StreamError::permanent("bad payload");
        assert_eq!(permanent.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_serialization_is_permanent() {
        let err: StreamError = serde_json::from_str::<serde_json::Value>("{invalid")
            .map_err(StreamError::from)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }
}
