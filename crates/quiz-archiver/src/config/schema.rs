use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filename::{self, AttemptInfo, CourseInfo, QuizInfo, UserInfo};

pub const DEFAULT_ARCHIVE_FILENAME_PATTERN: &str =
    "quiz-archive-${courseshortname}-${courseid}-${quizname}-${quizid}_${date}-${time}";

pub const DEFAULT_ATTEMPT_FILENAME_PATTERN: &str = "${attemptid}-${username}_${date}-${time}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverConfig {
    pub version: String,
    /// Falls back to [`crate::db::default_database_path`] when unset.
    #[serde(default)]
    pub database_path: Option<String>,
    pub storage_directory: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Trusted timestamping settings. Handed by value to every
/// [`TspManager`](crate::tsp::TspManager), so a running signing operation
/// never observes a config change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Sign artifacts as soon as they are linked.
    #[serde(default)]
    pub automatic: bool,
    #[serde(default)]
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
    /// Artifact lifetime applied to new jobs. Unset keeps artifacts forever.
    #[serde(default)]
    pub retention_seconds: Option<i64>,
    #[serde(default = "default_archive_filename_pattern")]
    pub archive_filename_pattern: String,
    #[serde(default = "default_attempt_filename_pattern")]
    pub attempt_filename_pattern: String,
    #[serde(default = "default_temporary_file_max_age")]
    pub temporary_file_max_age_seconds: i64,
}

fn default_timeout_minutes() -> i64 {
    6 * 60
}

fn default_archive_filename_pattern() -> String {
    DEFAULT_ARCHIVE_FILENAME_PATTERN.to_string()
}

fn default_attempt_filename_pattern() -> String {
    DEFAULT_ATTEMPT_FILENAME_PATTERN.to_string()
}

fn default_temporary_file_max_age() -> i64 {
    24 * 60 * 60
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            retention_seconds: None,
            archive_filename_pattern: default_archive_filename_pattern(),
            attempt_filename_pattern: default_attempt_filename_pattern(),
            temporary_file_max_age_seconds: default_temporary_file_max_age(),
        }
    }
}

impl JobsConfig {
    /// Archive filename built from the configured pattern.
    pub fn archive_filename(
        &self,
        course: &CourseInfo,
        quiz: &QuizInfo,
        now: DateTime<Utc>,
    ) -> Result<String> {
        filename::generate_archive_filename(course, quiz, &self.archive_filename_pattern, now)
    }

    /// Attempt report filename built from the configured pattern.
    pub fn attempt_filename(
        &self,
        course: &CourseInfo,
        quiz: &QuizInfo,
        attempt: &AttemptInfo,
        user: &UserInfo,
        now: DateTime<Utc>,
    ) -> Result<String> {
        filename::generate_attempt_filename(
            course,
            quiz,
            attempt,
            user,
            &self.attempt_filename_pattern,
            now,
        )
    }
}

/// Endpoints of the external archive worker and the LMS it calls back into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub url: String,
    pub moodle_base_url: String,
    pub moodle_ws_url: String,
    pub moodle_upload_url: String,
}
