//! Client for handing a new archive job to the external archive worker.
//!
//! The worker is told where to fetch attempts and where to upload the
//! artifact, and answers with its own job ID. All further progress arrives as
//! callbacks against the job's access token.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info_span, Instrument};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::job::JobScope;
use crate::sanitize::{redact_token, redact_url};

/// Protocol version spoken with the worker.
pub const API_VERSION: u32 = 6;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rejection bodies are cut to this length before they reach an error.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((idx, _)) => format!("{}... (truncated)", &body[..idx]),
        None => body.to_string(),
    }
}

/// Export of quiz attempts as rendered reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptsTask {
    pub attemptids: Vec<i64>,
    pub fetch_metadata: bool,
    /// Report sections to include, e.g. `{"question": true, "history": false}`.
    #[serde(default)]
    pub sections: Map<String, Value>,
    pub paper_format: String,
    pub keep_html_files: bool,
    pub filename_pattern: String,
}

/// A Moodle backup the worker should download into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTask {
    pub backupid: String,
    pub userid: i64,
    pub context: i64,
    pub filename: String,
    pub file_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnqueueRequest {
    pub api_version: u32,
    pub moodle_base_url: String,
    pub moodle_ws_url: String,
    pub moodle_upload_url: String,
    pub wstoken: String,
    pub courseid: i64,
    pub cmid: i64,
    pub quizid: i64,
    pub task_archive_quiz_attempts: Option<AttemptsTask>,
    pub task_moodle_backups: Option<Vec<BackupTask>>,
    /// Job-wide options such as `archive_filename`, sent as top-level keys.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl EnqueueRequest {
    pub fn new(config: &WorkerConfig, wstoken: impl Into<String>, scope: JobScope) -> Self {
        Self {
            api_version: API_VERSION,
            moodle_base_url: config.moodle_base_url.clone(),
            moodle_ws_url: config.moodle_ws_url.clone(),
            moodle_upload_url: config.moodle_upload_url.clone(),
            wstoken: wstoken.into(),
            courseid: scope.course_id,
            cmid: scope.cm_id,
            quizid: scope.quiz_id,
            task_archive_quiz_attempts: None,
            task_moodle_backups: None,
            options: Map::new(),
        }
    }

    pub fn with_attempts(mut self, task: AttemptsTask) -> Self {
        self.task_archive_quiz_attempts = Some(task);
        self
    }

    pub fn with_backups(mut self, backups: Vec<BackupTask>) -> Self {
        self.task_moodle_backups = Some(backups);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnqueueResponse {
    pub jobid: String,
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct WorkerClient {
    client: Client,
    url: String,
}

impl WorkerClient {
    pub fn new(url: impl Into<String>) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, WorkerError> {
        Self::new(config.url.clone())
    }

    /// Posts the job to the worker. Anything but HTTP 200 with a decodable
    /// body is an error.
    pub async fn enqueue(&self, request: &EnqueueRequest) -> Result<EnqueueResponse, WorkerError> {
        let span = info_span!(
            "worker_enqueue",
            worker = %redact_url(&self.url),
            quiz_id = request.quizid
        );
        self.post(request).instrument(span).await
    }

    async fn post(&self, request: &EnqueueRequest) -> Result<EnqueueResponse, WorkerError> {
        log::info!(
            "Enqueueing archive job for quiz {} (token {})",
            request.quizid,
            redact_token(&request.wstoken)
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;
        let decoded: EnqueueResponse =
            serde_json::from_str(&body).map_err(|e| WorkerError::Decode(e.to_string()))?;

        log::info!(
            "Worker accepted job {} with status {}",
            decoded.jobid,
            decoded.status
        );
        Ok(decoded)
    }
}
