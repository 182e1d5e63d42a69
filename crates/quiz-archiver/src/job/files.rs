//! Artifact and temporary file lifecycle of an archive job.
//!
//! Both are weak references: the job stores handles, the bytes live in the
//! [`FileStore`](crate::storage::FileStore).

use chrono::{DateTime, Utc};
use tracing::info_span;

use super::archive_job::{from_timestamp, ArchiveContext, ArchiveJob, Artifact};
use super::status::JobStatus;
use crate::db::{job_repo, tsp_repo};
use crate::error::{ArchiverError, Result};
use crate::storage::is_valid_handle;

/// A temporary file linked to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryFile {
    pub handle: String,
    pub linked_at: DateTime<Utc>,
}

impl ArchiveJob {
    /// Binds the artifact, replacing any previous binding.
    ///
    /// Returns false without touching the job if `handle` is not a valid
    /// file handle.
    pub fn link_artifact(&self, handle: &str, checksum: &str) -> Result<bool> {
        if !is_valid_handle(handle) {
            log::warn!(
                "Refusing to link invalid artifact handle to job {}",
                self.external_id()
            );
            return Ok(false);
        }

        let updated = job_repo::update_artifact(
            &self.context().db,
            self.id(),
            Some(handle),
            Some(checksum),
            Utc::now().timestamp(),
        )?;
        if updated == 0 {
            return Err(ArchiverError::not_found("job", self.id()));
        }

        log::info!("Linked artifact {} to job {}", handle, self.external_id());
        Ok(true)
    }

    pub fn artifact(&self) -> Result<Option<Artifact>> {
        let row = self.row()?;
        Ok(row.artifact_handle.map(|handle| Artifact {
            handle,
            checksum: row.artifact_checksum,
        }))
    }

    pub fn artifact_checksum(&self) -> Result<Option<String>> {
        Ok(self.artifact()?.and_then(|a| a.checksum))
    }

    /// Deletes the artifact file and any timestamp of it, clears the binding
    /// and moves the job to `deleted`. No-op if no artifact is linked.
    pub fn delete_artifact(&self) -> Result<()> {
        let Some(artifact) = self.artifact()? else {
            return Ok(());
        };

        let ctx = self.context();
        if !ctx.files.delete(&artifact.handle)? {
            log::debug!(
                "Artifact {} of job {} was already gone",
                artifact.handle,
                self.external_id()
            );
        }
        tsp_repo::delete_for_job(&ctx.db, self.id())?;
        job_repo::update_artifact(&ctx.db, self.id(), None, None, Utc::now().timestamp())?;
        self.set_status(JobStatus::Deleted, None)?;

        log::info!("Deleted artifact of job {}", self.external_id());
        Ok(())
    }

    /// Deletes the artifacts of all jobs whose retention deadline has passed.
    /// Returns the number of artifacts deleted. A failing job is logged and
    /// skipped.
    pub fn delete_expired_artifacts(ctx: &ArchiveContext) -> Result<usize> {
        Self::delete_expired_artifacts_at(ctx, Utc::now())
    }

    pub fn delete_expired_artifacts_at(ctx: &ArchiveContext, now: DateTime<Utc>) -> Result<usize> {
        let _span = info_span!("retention_sweep").entered();

        let ids = job_repo::find_expired_artifact_ids(&ctx.db, now.timestamp())?;
        let mut deleted = 0;
        for id in ids {
            match Self::get_by_id(ctx, id).and_then(|job| job.delete_artifact()) {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Failed to delete expired artifact of job {}: {}", id, e),
            }
        }

        if deleted > 0 {
            log::info!("Deleted {} expired artifacts", deleted);
        }
        Ok(deleted)
    }

    /// Links a temporary file. The file does not need to exist yet.
    pub fn link_temporary_file(&self, handle: &str) -> Result<()> {
        if !is_valid_handle(handle) {
            return Err(ArchiverError::InvalidInput(format!(
                "invalid temporary file handle '{}'",
                handle
            )));
        }
        job_repo::insert_temp_file(
            &self.context().db,
            self.id(),
            handle,
            Utc::now().timestamp(),
        )?;
        Ok(())
    }

    pub fn temporary_files(&self) -> Result<Vec<TemporaryFile>> {
        Ok(job_repo::find_temp_files(&self.context().db, self.id())?
            .into_iter()
            .map(|f| TemporaryFile {
                handle: f.handle,
                linked_at: from_timestamp(f.created_at),
            })
            .collect())
    }

    /// Deletes every linked temporary file that still resolves, together with
    /// its link. Links whose content is gone are left alone. Returns the
    /// number of deleted files.
    pub fn delete_temporary_files(&self) -> Result<usize> {
        let ctx = self.context();
        let mut deleted = 0;
        for file in job_repo::find_temp_files(&ctx.db, self.id())? {
            if !ctx.files.delete(&file.handle)? {
                continue;
            }
            job_repo::delete_temp_file(&ctx.db, self.id(), &file.handle)?;
            deleted += 1;
        }

        if deleted > 0 {
            log::debug!(
                "Deleted {} temporary files of job {}",
                deleted,
                self.external_id()
            );
        }
        Ok(deleted)
    }
}
