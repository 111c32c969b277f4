use crate::db::QueryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A configuration value needed to reach the database is absent or empty
    #[error("Configuration value `{key}` is missing")]
    ConfigurationMissing { key: String },

    /// Opening, querying, reading from or closing the connection failed
    #[error("Query execution failed at {}", .0.stage())]
    QueryExecutionFailed(#[from] QueryError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ConfigurationMissing { .. } | Error::QueryExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking connection details
    pub fn user_message(&self) -> String {
        match self {
            Error::ConfigurationMissing { .. } => "Database is not configured".to_string(),
            Error::QueryExecutionFailed(_) => "Database query failed".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::ConfigurationMissing { key } => {
                tracing::error!(key = %key, "Configuration error: {}", self);
            }
            Error::QueryExecutionFailed(source) => {
                tracing::error!(stage = source.stage(), "Query error: {}", self.source_chain());
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

impl Error {
    /// Flatten the error and its sources into one message for logging.
    fn source_chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
