use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Job run failed: {0}")]
    Run(#[from] RunError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting '{key}'")]
    Missing { key: String },

    #[error("Invalid value '{value}' for setting '{key}'")]
    Invalid { key: String, value: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} fetching stream from {url}")]
    Status { status: u16, url: String },

    #[error("Stream read failed: {0}")]
    Read(String),

    #[error("Download URL unavailable: {0}")]
    UrlUnavailable(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("Job not found: {0}")]
    NotFound(String),
}

/// Reference data could not be snapshotted at job start.
#[derive(Error, Debug)]
#[error("Reference data load failed: {0}")]
pub struct ReferenceError(pub String);

/// Failure modes of a single job run. Every variant maps onto a terminal
/// job status in the runner's finalizer.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Pool(#[from] crate::fragment::pool::PoolError),

    #[error("Error count {error_lines} reached fail-fast threshold {threshold}")]
    FailFast { error_lines: u64, threshold: u64 },

    #[error("Resident memory {resident_mb} MB exceeded limit of {limit_mb} MB")]
    MemoryPressure { resident_mb: u64, limit_mb: u64 },

    #[error("Job cancelled by user")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FeedscanError>;
