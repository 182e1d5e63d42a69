//! Test harness for isolated job tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use quiz_archiver::credentials;
use quiz_archiver::job::{ArchiveContext, ArchiveJob, JobScope, NewJob};
use quiz_archiver::storage::{FileRef, FileStore, FsFileStore, StoredFile, ARTIFACT_AREA};
use quiz_archiver::Database;

pub struct TestHarness {
    temp_dir: TempDir,
    pub ctx: ArchiveContext,
}

impl TestHarness {
    /// Fresh in-memory database and a file store under a temp directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let files = Arc::new(FsFileStore::new(temp_dir.path().join("files")));

        Self {
            temp_dir,
            ctx: ArchiveContext::new(db, files),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn scope() -> JobScope {
        JobScope {
            course_id: 2,
            cm_id: 15,
            quiz_id: 7,
        }
    }

    /// A job request with a freshly issued credential and a random external ID.
    pub fn new_job(&self) -> NewJob {
        let token = credentials::issue(&self.ctx.db, 3).expect("Failed to issue token");
        NewJob::new(uuid::Uuid::new_v4().to_string(), Self::scope(), 3, token)
    }

    pub fn create_job(&self) -> ArchiveJob {
        ArchiveJob::create(&self.ctx, self.new_job()).expect("Failed to create job")
    }

    /// Writes `content` as the job's artifact and links it.
    pub fn attach_artifact(&self, job: &ArchiveJob, content: &[u8]) -> StoredFile {
        let file = FileRef::new(ARTIFACT_AREA, job.id(), "/", "quiz-archive.tar.gz");
        let stored = self
            .ctx
            .files
            .store(&file, content)
            .expect("Failed to store artifact");
        assert!(job
            .link_artifact(&stored.handle, &stored.content_hash)
            .expect("Failed to link artifact"));
        stored
    }
}
