//! Error types with credential sanitization.
//!
//! Every failure in the export and archive pipeline maps onto one of the
//! variants below. Connection strings and passwords never appear in the
//! rendered messages.

use thiserror::Error;

/// Main error type for unlock operations.
///
/// # Security
/// All error messages are sanitized to prevent credential leakage.
/// Connection strings and passwords are never included in error output.
#[derive(Debug, Error)]
pub enum UnlockError {
    /// The data source could not be opened (credentials sanitized)
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Query preparation or execution failed
    #[error("Query execution failed: {context}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Column names, row shape, or file stats could not be read or are invalid
    #[error("Metadata error: {context}")]
    Metadata { context: String },

    /// An output file could not be created or written
    #[error("Write failed: {context}")]
    Write {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration or input validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Convenience type alias for Results with UnlockError
pub type Result<T> = std::result::Result<T, UnlockError>;

impl UnlockError {
    /// Creates a connection error with sanitized context
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a query error for the named export
    pub fn query_failed(context: impl Into<String>, error: sqlx::Error) -> Self {
        Self::Query {
            context: context.into(),
            source: error,
        }
    }

    /// Creates a metadata error
    pub fn metadata(context: impl Into<String>) -> Self {
        Self::Metadata {
            context: context.into(),
        }
    }

    /// Creates a write error with context
    pub fn write_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Write {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the whole run.
    ///
    /// Only query failures are fatal; every other kind aborts the step
    /// that raised it and the run continues.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}
