//! Error types for Mixology

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixologyError>;

#[derive(Error, Debug)]
pub enum MixologyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MixologyError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MixologyError::InvalidInput(_) => 3,
            MixologyError::Repository(RepositoryError::NotFound(_)) => 2,
            MixologyError::Repository(_) => 1,
            MixologyError::Config(_) => 1,
            MixologyError::Store(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failures reported by drink repositories
///
/// Repositories never panic on network or parse problems; they return one of
/// these so processors can fold them into `Async::Fail`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
