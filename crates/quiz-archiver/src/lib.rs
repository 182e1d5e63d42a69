pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod filename;
pub mod job;
pub mod sanitize;
pub mod storage;
pub mod telemetry;
pub mod tsp;
pub mod worker;

pub use config::{load_config, ArchiverConfig, JobsConfig, SigningConfig};
pub use db::Database;
pub use error::{ArchiverError, ConfigError, Result, StorageError, WorkerError};
pub use job::{ArchiveContext, ArchiveJob, JobScope, JobStatus, NewJob, RetentionSweeper};
pub use storage::{FileRef, FileStore, FsFileStore};
pub use tsp::{TspClient, TspError, TspManager};
pub use worker::{EnqueueRequest, WorkerClient};
