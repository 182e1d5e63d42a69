//! Archive jobs: state machine, artifact and temporary file lifecycle,
//! and the periodic sweeps over them.

mod archive_job;
mod files;
mod status;
mod sweeper;

pub use archive_job::{
    ArchiveContext, ArchiveJob, Artifact, Attempt, JobMetadata, JobScope, NewJob, StatusExtras,
    TerminalCleanup, TspSummary,
};
pub(crate) use archive_job::from_timestamp;
pub use files::TemporaryFile;
pub use status::{JobStatus, ParseStatusError};
pub use sweeper::{RetentionSweeper, SweepReport};
