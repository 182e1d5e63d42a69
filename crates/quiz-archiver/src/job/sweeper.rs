//! Periodic housekeeping, meant to be triggered out-of-band (cron, timer).
//!
//! Every step only advances jobs toward a terminal status or removes data of
//! already terminal jobs, so a sweep may overlap with worker callbacks.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info_span;

use super::archive_job::{ArchiveContext, ArchiveJob};
use crate::config::JobsConfig;
use crate::storage::TEMP_AREA;

/// Outcome of one [`RetentionSweeper::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_artifacts: usize,
    pub timed_out_jobs: usize,
    pub purged_temporary_files: usize,
    /// Steps that failed as a whole. Per-job failures are only logged.
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct RetentionSweeper {
    ctx: ArchiveContext,
    timeout_minutes: i64,
    temporary_file_max_age_seconds: i64,
}

impl RetentionSweeper {
    pub fn new(ctx: ArchiveContext, config: &JobsConfig) -> Self {
        Self {
            ctx,
            timeout_minutes: config.timeout_minutes,
            temporary_file_max_age_seconds: config.temporary_file_max_age_seconds,
        }
    }

    /// Deletes expired artifacts, times out overdue jobs and purges stale
    /// scratch files. A failing step does not stop the following ones.
    pub fn run(&self) -> SweepReport {
        let _span = info_span!("sweep").entered();
        let mut report = SweepReport::default();

        match ArchiveJob::delete_expired_artifacts(&self.ctx) {
            Ok(count) => report.expired_artifacts = count,
            Err(e) => {
                log::error!("Expired artifact sweep failed: {}", e);
                report.errors.push(format!("expired artifacts: {}", e));
            }
        }

        match ArchiveJob::timeout_overdue_jobs(&self.ctx, self.timeout_minutes) {
            Ok(count) => report.timed_out_jobs = count,
            Err(e) => {
                log::error!("Job timeout sweep failed: {}", e);
                report.errors.push(format!("job timeouts: {}", e));
            }
        }

        // No file can be older than a maximum age chrono cannot represent.
        let cutoff = Duration::try_seconds(self.temporary_file_max_age_seconds)
            .and_then(|max_age| Utc::now().checked_sub_signed(max_age));
        if let Some(cutoff) = cutoff {
            match self.ctx.files.purge_area(TEMP_AREA, cutoff) {
                Ok(count) => report.purged_temporary_files = count,
                Err(e) => {
                    log::error!("Temporary file purge failed: {}", e);
                    report.errors.push(format!("temporary files: {}", e));
                }
            }
        }

        log::info!(
            "Sweep finished: {} expired artifacts, {} timed out jobs, {} purged temporary files",
            report.expired_artifacts,
            report.timed_out_jobs,
            report.purged_temporary_files
        );

        report
    }
}
