use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of an archive job.
///
/// There is no transition table: any status may follow any other. Only
/// entering a terminal status carries side effects (see
/// [`ArchiveJob::set_status_with`](super::ArchiveJob::set_status_with)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted status could not be read. Never written by normal flow.
    Unknown,
    Uninitialized,
    AwaitingProcessing,
    Running,
    WaitingForBackup,
    Finalizing,
    Finished,
    Failed,
    Timeout,
    Deleted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 10] = [
        JobStatus::Unknown,
        JobStatus::Uninitialized,
        JobStatus::AwaitingProcessing,
        JobStatus::Running,
        JobStatus::WaitingForBackup,
        JobStatus::Finalizing,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Timeout,
        JobStatus::Deleted,
    ];

    /// Statuses from which the worker makes no further progress.
    pub const TERMINAL: [JobStatus; 4] = [
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Timeout,
        JobStatus::Deleted,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Uninitialized => "uninitialized",
            JobStatus::AwaitingProcessing => "awaiting_processing",
            JobStatus::Running => "running",
            JobStatus::WaitingForBackup => "waiting_for_backup",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job status '{}'", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    /// Case-insensitive, so the worker's `RUNNING` parses as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<JobStatus> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                JobStatus::Finished,
                JobStatus::Failed,
                JobStatus::Timeout,
                JobStatus::Deleted
            ]
        );
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_display_from_str_agree() {
        for status in JobStatus::ALL {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(
            "WAITING_FOR_BACKUP".parse::<JobStatus>(),
            Ok(JobStatus::WaitingForBackup)
        );
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::AwaitingProcessing).unwrap(),
            "\"awaiting_processing\""
        );
    }
}
