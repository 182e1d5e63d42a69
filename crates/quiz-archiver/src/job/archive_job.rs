use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::info_span;

use super::status::JobStatus;
use crate::config::{ArchiverConfig, JobsConfig, SigningConfig};
use crate::credentials;
use crate::db::job_repo::{self, AttemptRow, JobRow};
use crate::db::{default_database_path, tsp_repo, Database, DatabaseError};
use crate::error::{ArchiverError, ConfigError, Result};
use crate::storage::{FileStore, FsFileStore};
use crate::tsp::TspManager;

/// Free-form payload attached to a status update, e.g. `{"progress": 40}`.
pub type StatusExtras = serde_json::Map<String, serde_json::Value>;

/// Shared collaborators every job handle needs.
#[derive(Clone)]
pub struct ArchiveContext {
    pub db: Database,
    pub files: Arc<dyn FileStore>,
}

impl ArchiveContext {
    pub fn new(db: Database, files: Arc<dyn FileStore>) -> Self {
        Self { db, files }
    }

    /// Opens the configured database and a filesystem store under the
    /// configured storage directory.
    pub fn open(config: &ArchiverConfig) -> Result<Self> {
        let db_path = match &config.database_path {
            Some(path) => PathBuf::from(path),
            None => default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "database_path is unset and no home directory was found".to_string(),
            })?,
        };
        let db = Database::open(&db_path)?;
        let files = Arc::new(FsFileStore::new(&config.storage_directory));
        Ok(Self::new(db, files))
    }
}

/// Course module scope of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobScope {
    pub course_id: i64,
    pub cm_id: i64,
    pub quiz_id: i64,
}

/// An attempt covered by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub attempt_id: i64,
    pub user_id: i64,
}

/// Side effects applied when a job enters a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCleanup {
    pub revoke_credential: bool,
    pub delete_temporary_files: bool,
}

impl Default for TerminalCleanup {
    fn default() -> Self {
        Self {
            revoke_credential: true,
            delete_temporary_files: true,
        }
    }
}

/// Parameters for [`ArchiveJob::create`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub external_id: String,
    pub scope: JobScope,
    pub user_id: i64,
    pub access_token: String,
    pub retention_seconds: Option<i64>,
    pub attempts: Vec<Attempt>,
    pub settings: BTreeMap<String, Option<String>>,
    pub status: JobStatus,
}

impl NewJob {
    pub fn new(
        external_id: impl Into<String>,
        scope: JobScope,
        user_id: i64,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            scope,
            user_id,
            access_token: access_token.into(),
            retention_seconds: None,
            attempts: Vec::new(),
            settings: BTreeMap::new(),
            status: JobStatus::Unknown,
        }
    }

    /// Like [`NewJob::new`] with the configured artifact retention applied.
    pub fn from_config(
        config: &JobsConfig,
        external_id: impl Into<String>,
        scope: JobScope,
        user_id: i64,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            retention_seconds: config.retention_seconds,
            ..Self::new(external_id, scope, user_id, access_token)
        }
    }

    pub fn retention_seconds(mut self, seconds: i64) -> Self {
        self.retention_seconds = Some(seconds);
        self
    }

    pub fn attempts(mut self, attempts: Vec<Attempt>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn settings(mut self, settings: BTreeMap<String, Option<String>>) -> Self {
        self.settings = settings;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }
}

/// Artifact bound to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub handle: String,
    pub checksum: Option<String>,
}

/// Summary of a stored timestamp for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TspSummary {
    pub server: String,
    pub created_at: DateTime<Utc>,
}

/// Serializable view of a job for listings.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetadata {
    pub id: i64,
    pub external_id: String,
    pub scope: JobScope,
    pub user_id: i64,
    pub status: JobStatus,
    pub status_extras: Option<StatusExtras>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retention_until: Option<DateTime<Utc>>,
    pub artifact: Option<Artifact>,
    pub tsp: Option<TspSummary>,
    pub settings: BTreeMap<String, Option<String>>,
    pub attempt_count: usize,
}

/// Handle to a persisted archive job.
///
/// Identity, scope, credential and retention deadline are immutable and
/// cached. Status, extras and the artifact binding are read from the
/// database on every access.
pub struct ArchiveJob {
    ctx: ArchiveContext,
    id: i64,
    external_id: String,
    scope: JobScope,
    user_id: i64,
    access_token: String,
    retention_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for ArchiveJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveJob")
            .field("id", &self.id)
            .field("external_id", &self.external_id)
            .field("scope", &self.scope)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("retention_until", &self.retention_until)
            .finish_non_exhaustive()
    }
}

/// Converts stored seconds to a date, saturating at the range chrono can
/// represent.
pub(crate) fn from_timestamp(secs: i64) -> DateTime<Utc> {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(at) => at,
        None if secs > 0 => DateTime::<Utc>::MAX_UTC,
        None => DateTime::<Utc>::MIN_UTC,
    }
}

/// Absolute retention deadline for a job created at `now`.
fn retention_deadline(now: i64, retention_seconds: i64) -> Result<i64> {
    now.checked_add(retention_seconds)
        .filter(|deadline| Utc.timestamp_opt(*deadline, 0).single().is_some())
        .ok_or_else(|| {
            ArchiverError::InvalidInput(format!(
                "retention of {} seconds is out of range",
                retention_seconds
            ))
        })
}

impl ArchiveJob {
    fn from_row(ctx: &ArchiveContext, row: JobRow) -> Self {
        Self {
            ctx: ctx.clone(),
            id: row.id,
            external_id: row.external_id,
            scope: JobScope {
                course_id: row.course_id,
                cm_id: row.cm_id,
                quiz_id: row.quiz_id,
            },
            user_id: row.user_id,
            access_token: row.access_token,
            retention_until: row.retention_until.map(from_timestamp),
            created_at: from_timestamp(row.created_at),
        }
    }

    /// Persists a new job with its settings snapshot and attempt list.
    ///
    /// Fails with [`ArchiverError::AlreadyExists`] if the external ID is taken.
    pub fn create(ctx: &ArchiveContext, new: NewJob) -> Result<Self> {
        if job_repo::exists_by_external_id(&ctx.db, &new.external_id)? {
            return Err(ArchiverError::AlreadyExists(new.external_id));
        }

        let now = Utc::now().timestamp();
        let retention_until = new
            .retention_seconds
            .map(|secs| retention_deadline(now, secs))
            .transpose()?;
        let row = JobRow {
            id: 0,
            external_id: new.external_id.clone(),
            course_id: new.scope.course_id,
            cm_id: new.scope.cm_id,
            quiz_id: new.scope.quiz_id,
            user_id: new.user_id,
            status: new.status.as_str().to_string(),
            status_extras: None,
            access_token: new.access_token,
            artifact_handle: None,
            artifact_checksum: None,
            retention_until,
            created_at: now,
            updated_at: now,
        };
        let attempts: Vec<AttemptRow> = new
            .attempts
            .iter()
            .map(|a| AttemptRow {
                attempt_id: a.attempt_id,
                user_id: a.user_id,
            })
            .collect();

        let id = match job_repo::insert(&ctx.db, &row, &new.settings, &attempts) {
            Ok(id) => id,
            // Lost a race against a concurrent create with the same external ID.
            Err(e) if e.is_unique_violation() => {
                return Err(ArchiverError::AlreadyExists(new.external_id))
            }
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "Created archive job {} (id {}) for quiz {} with {} attempts",
            new.external_id,
            id,
            new.scope.quiz_id,
            attempts.len()
        );

        Ok(Self::from_row(ctx, JobRow { id, ..row }))
    }

    pub fn get_by_id(ctx: &ArchiveContext, id: i64) -> Result<Self> {
        job_repo::find_by_id(&ctx.db, id)?
            .map(|row| Self::from_row(ctx, row))
            .ok_or_else(|| ArchiverError::not_found("job", id))
    }

    pub fn get_by_external_id(ctx: &ArchiveContext, external_id: &str) -> Result<Self> {
        job_repo::find_by_external_id(&ctx.db, external_id)?
            .map(|row| Self::from_row(ctx, row))
            .ok_or_else(|| ArchiverError::not_found("job", external_id))
    }

    /// All jobs of a quiz, newest first.
    pub fn list_for_quiz(ctx: &ArchiveContext, scope: JobScope) -> Result<Vec<Self>> {
        let rows = job_repo::list_for_quiz(&ctx.db, scope.course_id, scope.cm_id, scope.quiz_id)?;
        Ok(rows
            .into_iter()
            .map(|row| Self::from_row(ctx, row))
            .collect())
    }

    /// Listing view of all jobs of a quiz, newest first.
    pub fn metadata_for_quiz(ctx: &ArchiveContext, scope: JobScope) -> Result<Vec<JobMetadata>> {
        Self::list_for_quiz(ctx, scope)?
            .iter()
            .map(ArchiveJob::metadata)
            .collect()
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn scope(&self) -> JobScope {
        self.scope
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn retention_until(&self) -> Option<DateTime<Utc>> {
        self.retention_until
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn context(&self) -> &ArchiveContext {
        &self.ctx
    }

    pub(crate) fn row(&self) -> Result<JobRow> {
        job_repo::find_by_id(&self.ctx.db, self.id)?
            .ok_or_else(|| ArchiverError::not_found("job", self.id))
    }

    /// Current status. Degrades to [`JobStatus::Unknown`] when it cannot be read.
    pub fn status(&self) -> JobStatus {
        match job_repo::find_status(&self.ctx.db, self.id) {
            Ok(Some(status)) => status.parse().unwrap_or_else(|e| {
                log::warn!("Job {}: {}", self.external_id, e);
                JobStatus::Unknown
            }),
            Ok(None) => JobStatus::Unknown,
            Err(e) => {
                log::warn!("Failed to read status of job {}: {}", self.external_id, e);
                JobStatus::Unknown
            }
        }
    }

    pub fn status_extras(&self) -> Result<Option<StatusExtras>> {
        let row = self.row()?;
        parse_extras(row.status_extras.as_deref())
    }

    pub fn updated_at(&self) -> Result<DateTime<Utc>> {
        Ok(from_timestamp(self.row()?.updated_at))
    }

    /// True once the job reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    /// Sets the status with the default terminal cleanup (revoke the
    /// credential, delete temporary files).
    pub fn set_status(&self, status: JobStatus, extras: Option<StatusExtras>) -> Result<()> {
        self.set_status_with(status, extras, TerminalCleanup::default())
    }

    /// Sets the status and replaces the extras wholesale.
    ///
    /// Not state-checked: callers must not move a terminal job if that has to
    /// be prevented. When `status` is terminal, the cleanup toggles apply.
    pub fn set_status_with(
        &self,
        status: JobStatus,
        extras: Option<StatusExtras>,
        cleanup: TerminalCleanup,
    ) -> Result<()> {
        let extras_json = extras
            .map(|e| serde_json::to_string(&e))
            .transpose()
            .map_err(|e| ArchiverError::InvalidInput(format!("unencodable status extras: {}", e)))?;

        let updated = job_repo::update_status(
            &self.ctx.db,
            self.id,
            status.as_str(),
            extras_json.as_deref(),
            Utc::now().timestamp(),
        )?;
        if updated == 0 {
            return Err(ArchiverError::not_found("job", self.id));
        }

        log::debug!("Job {} is now {}", self.external_id, status);

        if status.is_terminal() {
            if cleanup.revoke_credential {
                self.revoke_credential()?;
            }
            if cleanup.delete_temporary_files {
                self.delete_temporary_files()?;
            }
        }

        Ok(())
    }

    /// Moves the job to `timeout` if it is older than `timeout_minutes`.
    /// Returns false for jobs that are already complete or not yet overdue.
    pub fn timeout_if_overdue(&self, timeout_minutes: i64) -> Result<bool> {
        self.timeout_if_overdue_at(timeout_minutes, Utc::now())
    }

    pub fn timeout_if_overdue_at(&self, timeout_minutes: i64, now: DateTime<Utc>) -> Result<bool> {
        if self.is_complete() {
            return Ok(false);
        }

        // A timeout too large to represent never expires.
        let Some(deadline) = Duration::try_minutes(timeout_minutes)
            .and_then(|timeout| self.created_at.checked_add_signed(timeout))
        else {
            return Ok(false);
        };
        if deadline < now {
            log::info!(
                "Job {} exceeded its {} minute timeout",
                self.external_id,
                timeout_minutes
            );
            self.set_status(JobStatus::Timeout, None)?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Times out every overdue job that is not yet complete.
    /// Returns the number of jobs moved to `timeout`.
    pub fn timeout_overdue_jobs(ctx: &ArchiveContext, timeout_minutes: i64) -> Result<usize> {
        let _span = info_span!("timeout_sweep", timeout_minutes).entered();

        let now = Utc::now();
        let Some(cutoff) = Duration::try_minutes(timeout_minutes)
            .and_then(|timeout| now.checked_sub_signed(timeout))
        else {
            log::debug!("Timeout of {} minutes cannot elapse", timeout_minutes);
            return Ok(0);
        };
        let cutoff = cutoff.timestamp();
        let terminal: Vec<&str> = JobStatus::TERMINAL.iter().map(|s| s.as_str()).collect();
        let ids = job_repo::find_ids_created_before(&ctx.db, cutoff, &terminal)?;

        let mut timed_out = 0;
        for id in ids {
            let result = Self::get_by_id(ctx, id)
                .and_then(|job| job.timeout_if_overdue_at(timeout_minutes, now));
            match result {
                Ok(true) => timed_out += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to time out job {}: {}", id, e),
            }
        }

        Ok(timed_out)
    }

    /// Read and write access are the same check: equality with the job's
    /// credential.
    pub fn has_read_access(&self, token: &str) -> bool {
        self.access_token == token
    }

    pub fn has_write_access(&self, token: &str) -> bool {
        self.access_token == token
    }

    /// Fails with [`ArchiverError::AccessDenied`] unless `token` grants write access.
    pub fn require_write_access(&self, token: &str) -> Result<()> {
        if self.has_write_access(token) {
            Ok(())
        } else {
            Err(ArchiverError::AccessDenied)
        }
    }

    fn revoke_credential(&self) -> Result<()> {
        if credentials::revoke(&self.ctx.db, &self.access_token)? {
            log::debug!(
                "Revoked access token {} of job {}",
                crate::sanitize::redact_token(&self.access_token),
                self.external_id
            );
        }
        Ok(())
    }

    pub fn settings(&self) -> Result<BTreeMap<String, Option<String>>> {
        Ok(job_repo::find_settings(&self.ctx.db, self.id)?)
    }

    pub fn attempts(&self) -> Result<Vec<Attempt>> {
        Ok(job_repo::find_attempts(&self.ctx.db, self.id)?
            .into_iter()
            .map(|a| Attempt {
                attempt_id: a.attempt_id,
                user_id: a.user_id,
            })
            .collect())
    }

    /// Timestamping façade for this job.
    pub fn tsp(&self, config: &SigningConfig) -> TspManager<'_> {
        TspManager::new(self, config.clone())
    }

    pub fn metadata(&self) -> Result<JobMetadata> {
        let row = self.row()?;
        let tsp = tsp_repo::find_by_job_id(&self.ctx.db, self.id)?.map(|t| TspSummary {
            server: t.server,
            created_at: from_timestamp(t.created_at),
        });

        Ok(JobMetadata {
            id: self.id,
            external_id: self.external_id.clone(),
            scope: self.scope,
            user_id: self.user_id,
            status: row.status.parse().unwrap_or(JobStatus::Unknown),
            status_extras: parse_extras(row.status_extras.as_deref())?,
            created_at: self.created_at,
            updated_at: from_timestamp(row.updated_at),
            retention_until: self.retention_until,
            artifact: row.artifact_handle.map(|handle| Artifact {
                handle,
                checksum: row.artifact_checksum,
            }),
            tsp,
            settings: self.settings()?,
            attempt_count: job_repo::find_attempts(&self.ctx.db, self.id)?.len(),
        })
    }

    /// Deletes the job and everything it owns: credential, temporary files,
    /// artifact (and with it any timestamp), settings, attempts and the job
    /// row. Consumes the handle.
    pub fn delete(self) -> Result<()> {
        self.revoke_credential()?;
        self.delete_temporary_files()?;
        self.delete_artifact()?;
        job_repo::delete_cascade(&self.ctx.db, self.id)?;

        log::info!("Deleted archive job {} (id {})", self.external_id, self.id);
        Ok(())
    }
}

fn parse_extras(raw: Option<&str>) -> Result<Option<StatusExtras>> {
    raw.map(serde_json::from_str::<StatusExtras>)
        .transpose()
        .map_err(|e| {
            ArchiverError::from(DatabaseError::Json {
                column: "status_extras",
                source: e,
            })
        })
}
