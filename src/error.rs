use thiserror::Error;

/// Errors surfaced by the recommendation pipeline
#[derive(Debug, Error)]
pub enum RecommendError {
    /// A search or lookup produced nothing; shown to the user as a message
    #[error("{0}")]
    NotFound(String),

    /// The external catalog could not be reached or answered with an error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Stored data is missing a required field or label
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Missing or invalid configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, RecommendError>;
