use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("database connection failed")]
    ConnectionFailed(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    MigrateFailed(#[from] sqlx::migrate::MigrateError),

    #[error("failed to (de)serialize a stored record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
