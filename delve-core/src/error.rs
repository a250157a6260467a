//! Unified error handling system
//!
//! Structured error types carrying context and recovery suggestions. Crates
//! further up the stack wrap [`DelveError`] in their own error enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type DelveResult<T> = Result<T, DelveError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type shared by every delve crate
#[derive(Error, Debug)]
pub enum DelveError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Search or page fetch failure
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Filesystem level failure for collections, sessions and directories
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        model: Option<String>,
        context: ErrorContext,
    },

    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        provider: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DelveError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::Config { context, .. }
            | DelveError::Network { context, .. }
            | DelveError::Storage { context, .. }
            | DelveError::Validation { context, .. }
            | DelveError::NotFound { context, .. }
            | DelveError::Timeout { context, .. }
            | DelveError::Llm { context, .. }
            | DelveError::Embedding { context, .. }
            | DelveError::Internal { context, .. } => Some(context),
            DelveError::Io(_) | DelveError::Serialization(_) => None,
        }
    }

    /// Transient failures worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DelveError::Network { .. } | DelveError::Timeout { .. } | DelveError::Llm { .. }
        )
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DelveError::Network { .. } => Some(1000),
            DelveError::Timeout { .. } => Some(2000),
            DelveError::Llm { .. } => Some(500),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            DelveError::Internal { .. } => {
                error!(error_id = ?error_id, error = %self, "Internal error occurred");
            }
            DelveError::Config { .. } | DelveError::Validation { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration or validation error");
            }
            DelveError::Network { .. } | DelveError::Timeout { .. } => {
                warn!(error_id = ?error_id, error = %self, "Network or timeout error (may be recoverable)");
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'delve config init' to create a default config"),
        }
    };
}

#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DelveError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DelveError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource:expr, $component:expr) => {
        $crate::DelveError::NotFound {
            resource: $resource.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Verify the resource path or URL"),
        }
    };
}
