use thiserror::Error;

/// Failure at one stage of a connection's life. Each variant keeps the driver error as its source.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Connection establishment failed
    #[error("Failed to open database connection")]
    Open(#[source] anyhow::Error),

    /// The database rejected the statement
    #[error("Failed to execute query")]
    Execute(#[source] anyhow::Error),

    /// Reading the next row from the cursor failed
    #[error("Failed to fetch row")]
    Fetch(#[source] anyhow::Error),

    /// Connection teardown failed
    #[error("Failed to close database connection")]
    Close(#[source] anyhow::Error),
}

impl QueryError {
    /// Stage name used as a log field
    pub fn stage(&self) -> &'static str {
        match self {
            QueryError::Open(_) => "open",
            QueryError::Execute(_) => "execute",
            QueryError::Fetch(_) => "fetch",
            QueryError::Close(_) => "close",
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, QueryError>;
