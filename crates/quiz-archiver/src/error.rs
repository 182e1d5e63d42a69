use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::tsp::TspError;

#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    #[error("Job with external id '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access denied")]
    AccessDenied,

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Failed to gather randomness: {0}")]
    Entropy(#[from] getrandom::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timestamp error: {0}")]
    Tsp(#[from] TspError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl ArchiverError {
    pub(crate) fn not_found(what: &'static str, key: impl ToString) -> Self {
        ArchiverError::NotFound {
            what,
            key: key.to_string(),
        }
    }

    /// True for lookup misses of any kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiverError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid filename pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan directory '{path}': {source}")]
    ScanDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file handle: {0}")]
    InvalidHandle(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Request to archive worker failed: {0}")]
    Transport(String),

    #[error("Archive worker rejected the job ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to decode archive worker response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
