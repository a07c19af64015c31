//! Error types shared by the control-plane repositories and the graph client.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("graph response did not contain the expected column")]
    MalformedGraphResponse,
    #[error("failed to serialize graph properties: {0}")]
    PropertySerialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
