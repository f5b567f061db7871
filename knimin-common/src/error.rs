//! Common error types for knimin

use thiserror::Error;

/// Common result type for knimin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across knimin tools
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database error raised by a named lookup store query
    #[error("Query '{context}' failed: {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a store error with the query that produced it
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        Error::Query {
            context: context.into(),
            source,
        }
    }
}
