use chrono::{DateTime, Utc};

use super::client::TspClient;
use crate::config::SigningConfig;
use crate::db::tsp_repo;
use crate::error::{ArchiverError, Result};
use crate::job::{from_timestamp, ArchiveJob};

/// A stored timestamp of a job's artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TspData {
    pub server: String,
    pub created_at: DateTime<Utc>,
    pub query: Vec<u8>,
    pub reply: Vec<u8>,
}

/// Timestamping for a single job, bound to a snapshot of the signing config.
pub struct TspManager<'a> {
    job: &'a ArchiveJob,
    config: SigningConfig,
}

impl<'a> TspManager<'a> {
    pub fn new(job: &'a ArchiveJob, config: SigningConfig) -> Self {
        Self { job, config }
    }

    pub fn job(&self) -> &ArchiveJob {
        self.job
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// True if signing and automatic signing are enabled and the job has no
    /// timestamp yet.
    pub fn wants_tsp_timestamp(&self) -> Result<bool> {
        if !self.config.enabled || !self.config.automatic {
            return Ok(false);
        }
        Ok(!self.has_tsp_timestamp()?)
    }

    pub fn has_tsp_timestamp(&self) -> Result<bool> {
        Ok(tsp_repo::exists_for_job(
            &self.job.context().db,
            self.job.id(),
        )?)
    }

    /// Timestamps the artifact checksum and stores the exchange.
    ///
    /// Always contacts the server, even if a timestamp exists already. Use
    /// [`Self::wants_tsp_timestamp`] to avoid duplicates.
    pub async fn timestamp(&self) -> Result<TspData> {
        let checksum = self.job.artifact_checksum()?.ok_or_else(|| {
            ArchiverError::PreconditionFailed(format!(
                "job {} has no artifact to timestamp",
                self.job.external_id()
            ))
        })?;

        if !self.config.enabled {
            return Err(ArchiverError::PreconditionFailed(
                "trusted timestamping is disabled".to_string(),
            ));
        }
        let server_url = self
            .config
            .server_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                ArchiverError::PreconditionFailed("no TSP server configured".to_string())
            })?;

        let client = TspClient::new(server_url)?;
        let response = client.sign(&checksum).await?;

        let created_at = Utc::now();
        tsp_repo::insert(
            &self.job.context().db,
            self.job.id(),
            server_url,
            created_at.timestamp(),
            &response.query,
            &response.reply,
        )?;

        log::info!(
            "Stored timestamp for artifact of job {}",
            self.job.external_id()
        );

        Ok(TspData {
            server: server_url.to_string(),
            created_at: from_timestamp(created_at.timestamp()),
            query: response.query,
            reply: response.reply,
        })
    }

    pub fn get_tsp_data(&self) -> Result<Option<TspData>> {
        let row = tsp_repo::find_by_job_id(&self.job.context().db, self.job.id())?;
        Ok(row.map(|row| TspData {
            server: row.server,
            created_at: from_timestamp(row.created_at),
            query: row.query,
            reply: row.reply,
        }))
    }

    /// Returns the number of removed records.
    pub fn delete_tsp_data(&self) -> Result<usize> {
        Ok(tsp_repo::delete_for_job(
            &self.job.context().db,
            self.job.id(),
        )?)
    }
}
