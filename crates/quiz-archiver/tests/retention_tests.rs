//! Retention sweep over artifacts, job timeouts and scratch files.

mod common;

use common::TestHarness;
use quiz_archiver::config::{load_config_from_str, JobsConfig};
use quiz_archiver::job::{ArchiveJob, JobStatus, NewJob, RetentionSweeper};
use quiz_archiver::storage::{FileRef, FileStore, TEMP_AREA};

#[test]
fn test_expired_artifact_is_deleted() {
    let harness = TestHarness::new();
    let job = ArchiveJob::create(
        &harness.ctx,
        harness
            .new_job()
            .retention_seconds(-1)
            .status(JobStatus::Finished),
    )
    .unwrap();
    let stored = harness.attach_artifact(&job, b"archive");

    assert_eq!(ArchiveJob::delete_expired_artifacts(&harness.ctx).unwrap(), 1);
    assert!(harness.ctx.files.resolve(&stored.handle).unwrap().is_none());
    assert_eq!(job.status(), JobStatus::Deleted);
    assert!(job.artifact().unwrap().is_none());

    // Nothing left to do on the next run.
    assert_eq!(ArchiveJob::delete_expired_artifacts(&harness.ctx).unwrap(), 0);
}

#[test]
fn test_unexpired_and_unbounded_artifacts_are_kept() {
    let harness = TestHarness::new();
    let kept = ArchiveJob::create(&harness.ctx, harness.new_job().retention_seconds(3600)).unwrap();
    let forever = harness.create_job();
    harness.attach_artifact(&kept, b"a");
    harness.attach_artifact(&forever, b"b");

    assert_eq!(ArchiveJob::delete_expired_artifacts(&harness.ctx).unwrap(), 0);
    assert!(kept.artifact().unwrap().is_some());
    assert!(forever.artifact().unwrap().is_some());
}

#[test]
fn test_one_missing_file_does_not_stop_the_sweep() {
    let harness = TestHarness::new();
    let first = ArchiveJob::create(&harness.ctx, harness.new_job().retention_seconds(-1)).unwrap();
    let second = ArchiveJob::create(&harness.ctx, harness.new_job().retention_seconds(-1)).unwrap();
    let stored = harness.attach_artifact(&first, b"a");
    harness.attach_artifact(&second, b"b");

    // The first artifact vanished from the store behind the job's back.
    harness.ctx.files.delete(&stored.handle).unwrap();

    assert_eq!(ArchiveJob::delete_expired_artifacts(&harness.ctx).unwrap(), 2);
    assert_eq!(first.status(), JobStatus::Deleted);
    assert_eq!(second.status(), JobStatus::Deleted);
}

#[test]
fn test_sweeper_runs_all_steps() {
    let harness = TestHarness::new();

    let expired = ArchiveJob::create(
        &harness.ctx,
        harness
            .new_job()
            .retention_seconds(-1)
            .status(JobStatus::Finished),
    )
    .unwrap();
    harness.attach_artifact(&expired, b"archive");

    let running = harness.create_job();
    running.set_status(JobStatus::Running, None).unwrap();
    harness
        .ctx
        .db
        .with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET created_at = created_at - 7200 WHERE id = ?1",
                [running.id()],
            )?;
            Ok(())
        })
        .unwrap();

    let scratch = FileRef::new(TEMP_AREA, running.id(), "/", "page-1.html");
    harness.ctx.files.store(&scratch, b"<html>").unwrap();

    let config = JobsConfig {
        timeout_minutes: 60,
        temporary_file_max_age_seconds: -60,
        ..JobsConfig::default()
    };
    let report = RetentionSweeper::new(harness.ctx.clone(), &config).run();

    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.expired_artifacts, 1);
    assert_eq!(report.timed_out_jobs, 1);
    assert_eq!(report.purged_temporary_files, 1);
    assert_eq!(running.status(), JobStatus::Timeout);
    assert!(harness.ctx.files.resolve(&scratch.handle()).unwrap().is_none());
}

#[test]
fn test_sweeper_with_huge_configured_timeout() {
    let harness = TestHarness::new();
    let config = load_config_from_str(
        r#"{ "version": "1.0", "storage_directory": "/tmp/archives",
             "jobs": { "timeout_minutes": 1000000000000 } }"#,
    )
    .unwrap();

    let running = harness.create_job();
    running.set_status(JobStatus::Running, None).unwrap();

    let report = RetentionSweeper::new(harness.ctx.clone(), &config.jobs).run();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.timed_out_jobs, 0);
    assert_eq!(running.status(), JobStatus::Running);
}

#[test]
fn test_configured_retention_reaches_jobs() {
    let harness = TestHarness::new();
    let config = load_config_from_str(
        r#"{ "version": "1.0", "storage_directory": "/tmp/archives",
             "jobs": { "retention_seconds": -1 } }"#,
    )
    .unwrap();

    let template = harness.new_job();
    let job = ArchiveJob::create(
        &harness.ctx,
        NewJob::from_config(
            &config.jobs,
            template.external_id,
            template.scope,
            template.user_id,
            template.access_token,
        ),
    )
    .unwrap();
    assert!(job.retention_until().unwrap() < job.created_at());

    harness.attach_artifact(&job, b"archive");
    assert_eq!(ArchiveJob::delete_expired_artifacts(&harness.ctx).unwrap(), 1);
    assert_eq!(job.status(), JobStatus::Deleted);
}
