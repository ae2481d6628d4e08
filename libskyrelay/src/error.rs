//! Error types for Skyrelay

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkyrelayError>;

#[derive(Error, Debug)]
pub enum SkyrelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkyrelayError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SkyrelayError::InvalidInput(_) => 3,
            SkyrelayError::Auth(_) => 2,
            SkyrelayError::Publish(PublishError::Authentication(_)) => 2,
            SkyrelayError::Config(_) => 2,
            SkyrelayError::Store(_) => 1,
            SkyrelayError::Fetch(_) => 1,
            SkyrelayError::Publish(_) => 1,
            SkyrelayError::Completion(_) => 1,
            SkyrelayError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse params file: {0}")]
    ParamsError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Failures of the durable seen-store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Item {0} has already been recorded")]
    AlreadyRecorded(i64),
}

/// Failures talking to the ranked-list source
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Non-success response from {url}: {status}")]
    NonOk { url: String, status: u16 },

    #[error("Malformed response body: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Session refresh failed: {0}")]
    Refresh(String),

    #[error("Failed to load session: {0}")]
    Load(String),

    #[error("Failed to persist session: {0}")]
    Persist(String),
}

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Malformed response body: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    #[error("Completion API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response body: {0}")]
    Decode(String),

    #[error("Completion returned no choices")]
    Empty,
}
