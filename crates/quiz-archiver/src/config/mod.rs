pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    ArchiverConfig, JobsConfig, LogFormat, LoggingConfig, SigningConfig, WorkerConfig,
    DEFAULT_ARCHIVE_FILENAME_PATTERN, DEFAULT_ATTEMPT_FILENAME_PATTERN,
};
