use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{op} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        op: String,
        attempts: u32,
        source: sqlx::Error,
    },

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl From<s3::error::S3Error> for StoreError {
    fn from(e: s3::error::S3Error) -> Self {
        StoreError::ObjectStore(e.to_string())
    }
}

impl From<s3::creds::error::CredentialsError> for StoreError {
    fn from(e: s3::creds::error::CredentialsError) -> Self {
        StoreError::ObjectStore(format!("credentials: {e}"))
    }
}
