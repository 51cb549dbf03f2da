use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroundwireError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Model returned an event without source post IDs")]
    MissingSourceIds,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
