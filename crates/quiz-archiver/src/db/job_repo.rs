//! Job repository: CRUD operations for the `jobs` table and the rows that
//! hang off a job (`job_settings`, `job_attempts`, `job_temp_files`).

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: i64,
    pub external_id: String,
    pub course_id: i64,
    pub cm_id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub status: String,
    pub status_extras: Option<String>,
    pub access_token: String,
    pub artifact_handle: Option<String>,
    pub artifact_checksum: Option<String>,
    pub retention_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            external_id: row.get("external_id")?,
            course_id: row.get("course_id")?,
            cm_id: row.get("cm_id")?,
            quiz_id: row.get("quiz_id")?,
            user_id: row.get("user_id")?,
            status: row.get("status")?,
            status_extras: row.get("status_extras")?,
            access_token: row.get("access_token")?,
            artifact_handle: row.get("artifact_handle")?,
            artifact_checksum: row.get("artifact_checksum")?,
            retention_until: row.get("retention_until")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// An (attempt, user) pair covered by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRow {
    pub attempt_id: i64,
    pub user_id: i64,
}

/// A temporary file linked to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFileRow {
    pub handle: String,
    pub created_at: i64,
}

/// Inserts a job together with its settings snapshot and attempt list in a
/// single transaction. Returns the new row id. `job.id` is ignored.
pub fn insert(
    db: &Database,
    job: &JobRow,
    settings: &BTreeMap<String, Option<String>>,
    attempts: &[AttemptRow],
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO jobs (external_id, course_id, cm_id, quiz_id, user_id, status,
             status_extras, access_token, artifact_handle, artifact_checksum,
             retention_until, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.external_id,
                job.course_id,
                job.cm_id,
                job.quiz_id,
                job.user_id,
                job.status,
                job.status_extras,
                job.access_token,
                job.artifact_handle,
                job.artifact_checksum,
                job.retention_until,
                job.created_at,
                job.updated_at,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt =
                tx.prepare("INSERT INTO job_settings (job_id, key, value) VALUES (?1, ?2, ?3)")?;
            for (key, value) in settings {
                stmt.execute(params![id, key, value])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO job_attempts (job_id, attempt_id, user_id) VALUES (?1, ?2, ?3)",
            )?;
            for attempt in attempts {
                stmt.execute(params![id, attempt.attempt_id, attempt.user_id])?;
            }
        }

        tx.commit()?;
        Ok(id)
    })
}

/// Finds a job by its internal ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
            .optional()?;
        Ok(row)
    })
}

/// Finds a job by the ID assigned by the archive worker.
pub fn find_by_external_id(
    db: &Database,
    external_id: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE external_id = ?1",
                params![external_id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Checks whether a job with the given external ID exists.
pub fn exists_by_external_id(db: &Database, external_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE external_id = ?1",
            params![external_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Lists all jobs of a quiz, newest first.
pub fn list_for_quiz(
    db: &Database,
    course_id: i64,
    cm_id: i64,
    quiz_id: i64,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE course_id = ?1 AND cm_id = ?2 AND quiz_id = ?3
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![course_id, cm_id, quiz_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Reads only the status column of a job.
pub fn find_status(db: &Database, id: i64) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(status)
    })
}

/// Overwrites status, status extras and updated_at of a job.
/// Returns the number of affected rows.
pub fn update_status(
    db: &Database,
    id: i64,
    status: &str,
    status_extras: Option<&str>,
    updated_at: i64,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE jobs SET status = ?2, status_extras = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status, status_extras, updated_at],
        )?;
        Ok(n)
    })
}

/// Binds (or clears, when both are `None`) the artifact of a job.
pub fn update_artifact(
    db: &Database,
    id: i64,
    handle: Option<&str>,
    checksum: Option<&str>,
    updated_at: i64,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE jobs SET artifact_handle = ?2, artifact_checksum = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, handle, checksum, updated_at],
        )?;
        Ok(n)
    })
}

/// Returns the IDs of jobs holding an artifact whose retention deadline lies
/// before `now`.
pub fn find_expired_artifact_ids(db: &Database, now: i64) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM jobs
             WHERE artifact_handle IS NOT NULL
               AND retention_until IS NOT NULL
               AND retention_until < ?1
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![now], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    })
}

/// Returns the IDs of jobs created before `created_before` whose status is
/// not one of `excluded_statuses`.
pub fn find_ids_created_before(
    db: &Database,
    created_before: i64,
    excluded_statuses: &[&str],
) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders: Vec<String> = (0..excluded_statuses.len())
            .map(|i| format!("?{}", i + 2))
            .collect();
        let sql = if placeholders.is_empty() {
            "SELECT id FROM jobs WHERE created_at < ?1 ORDER BY id".to_string()
        } else {
            format!(
                "SELECT id FROM jobs WHERE created_at < ?1 AND status NOT IN ({}) ORDER BY id",
                placeholders.join(", ")
            )
        };

        let mut param_values: Vec<&dyn rusqlite::types::ToSql> = vec![&created_before];
        for status in excluded_statuses {
            param_values.push(status);
        }

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(param_values.as_slice(), |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    })
}

/// Reads the settings snapshot of a job.
pub fn find_settings(
    db: &Database,
    job_id: i64,
) -> Result<BTreeMap<String, Option<String>>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT key, value FROM job_settings WHERE job_id = ?1 ORDER BY id")?;
        let settings = stmt
            .query_map(params![job_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<BTreeMap<String, Option<String>>, _>>()?;
        Ok(settings)
    })
}

/// Reads the attempt list of a job.
pub fn find_attempts(db: &Database, job_id: i64) -> Result<Vec<AttemptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT attempt_id, user_id FROM job_attempts WHERE job_id = ?1 ORDER BY id",
        )?;
        let attempts = stmt
            .query_map(params![job_id], |r| {
                Ok(AttemptRow {
                    attempt_id: r.get(0)?,
                    user_id: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attempts)
    })
}

/// Links a temporary file handle to a job. Linking the same handle twice is a
/// no-op. Returns true if a new link was created.
pub fn insert_temp_file(
    db: &Database,
    job_id: i64,
    handle: &str,
    created_at: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "INSERT OR IGNORE INTO job_temp_files (job_id, handle, created_at)
             VALUES (?1, ?2, ?3)",
            params![job_id, handle, created_at],
        )?;
        Ok(n > 0)
    })
}

/// Lists the temporary files linked to a job.
pub fn find_temp_files(db: &Database, job_id: i64) -> Result<Vec<TempFileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT handle, created_at FROM job_temp_files WHERE job_id = ?1 ORDER BY id",
        )?;
        let files = stmt
            .query_map(params![job_id], |r| {
                Ok(TempFileRow {
                    handle: r.get(0)?,
                    created_at: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    })
}

/// Removes a single temporary file link.
pub fn delete_temp_file(db: &Database, job_id: i64, handle: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "DELETE FROM job_temp_files WHERE job_id = ?1 AND handle = ?2",
            params![job_id, handle],
        )?;
        Ok(n)
    })
}

/// Deletes a job row and every row referencing it in one transaction.
pub fn delete_cascade(db: &Database, job_id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        for table in ["job_settings", "job_attempts", "job_temp_files", "job_tsp"] {
            tx.execute(
                &format!("DELETE FROM {} WHERE job_id = ?1", table),
                params![job_id],
            )?;
        }
        let n = tx.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        tx.commit()?;
        Ok(n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(external_id: &str) -> JobRow {
        JobRow {
            id: 0,
            external_id: external_id.to_string(),
            course_id: 2,
            cm_id: 5,
            quiz_id: 7,
            user_id: 3,
            status: "uninitialized".to_string(),
            status_extras: None,
            access_token: format!("token-{}", external_id),
            artifact_handle: None,
            artifact_checksum: None,
            retention_until: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    fn sample_settings() -> BTreeMap<String, Option<String>> {
        let mut settings = BTreeMap::new();
        settings.insert("export_attempts".to_string(), Some("1".to_string()));
        settings.insert("export_report_section_header".to_string(), None);
        settings
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let attempts = [
            AttemptRow {
                attempt_id: 10,
                user_id: 100,
            },
            AttemptRow {
                attempt_id: 11,
                user_id: 101,
            },
        ];
        let id = insert(&db, &sample_job("job-1"), &sample_settings(), &attempts).unwrap();

        let found = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.external_id, "job-1");
        assert_eq!(found.status, "uninitialized");

        let by_external = find_by_external_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(by_external, found);

        assert_eq!(find_settings(&db, id).unwrap(), sample_settings());
        assert_eq!(find_attempts(&db, id).unwrap(), attempts.to_vec());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, 42).unwrap().is_none());
        assert!(find_by_external_id(&db, "missing").unwrap().is_none());
        assert!(find_status(&db, 42).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_external_id_rolls_back() {
        let db = test_db();
        insert(&db, &sample_job("dup"), &sample_settings(), &[]).unwrap();

        let err = insert(&db, &sample_job("dup"), &sample_settings(), &[]).unwrap_err();
        assert!(err.is_unique_violation());

        let settings_rows: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM job_settings", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(settings_rows, 2);
    }

    #[test]
    fn test_update_status_and_artifact() {
        let db = test_db();
        let id = insert(&db, &sample_job("s1"), &BTreeMap::new(), &[]).unwrap();

        update_status(&db, id, "running", Some(r#"{"progress":50}"#), 1_700_000_100).unwrap();
        update_artifact(&db, id, Some("abc"), Some("def"), 1_700_000_200).unwrap();

        let found = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(found.status, "running");
        assert_eq!(found.status_extras.as_deref(), Some(r#"{"progress":50}"#));
        assert_eq!(found.artifact_handle.as_deref(), Some("abc"));
        assert_eq!(found.artifact_checksum.as_deref(), Some("def"));
        assert_eq!(found.updated_at, 1_700_000_200);
    }

    #[test]
    fn test_find_expired_artifact_ids() {
        let db = test_db();

        let mut expired = sample_job("expired");
        expired.retention_until = Some(100);
        expired.artifact_handle = Some("h1".to_string());
        let expired_id = insert(&db, &expired, &BTreeMap::new(), &[]).unwrap();

        let mut no_artifact = sample_job("no-artifact");
        no_artifact.retention_until = Some(100);
        insert(&db, &no_artifact, &BTreeMap::new(), &[]).unwrap();

        let mut future = sample_job("future");
        future.retention_until = Some(1_000);
        future.artifact_handle = Some("h2".to_string());
        insert(&db, &future, &BTreeMap::new(), &[]).unwrap();

        let mut forever = sample_job("forever");
        forever.artifact_handle = Some("h3".to_string());
        insert(&db, &forever, &BTreeMap::new(), &[]).unwrap();

        assert_eq!(find_expired_artifact_ids(&db, 500).unwrap(), vec![expired_id]);
    }

    #[test]
    fn test_find_ids_created_before() {
        let db = test_db();
        let old = insert(&db, &sample_job("old"), &BTreeMap::new(), &[]).unwrap();

        let mut finished = sample_job("finished");
        finished.status = "finished".to_string();
        insert(&db, &finished, &BTreeMap::new(), &[]).unwrap();

        let mut recent = sample_job("recent");
        recent.created_at = 1_800_000_000;
        insert(&db, &recent, &BTreeMap::new(), &[]).unwrap();

        let ids = find_ids_created_before(&db, 1_750_000_000, &["finished", "failed"]).unwrap();
        assert_eq!(ids, vec![old]);
    }

    #[test]
    fn test_temp_file_links() {
        let db = test_db();
        let id = insert(&db, &sample_job("t1"), &BTreeMap::new(), &[]).unwrap();

        assert!(insert_temp_file(&db, id, "aaa", 1).unwrap());
        assert!(!insert_temp_file(&db, id, "aaa", 2).unwrap());
        assert!(insert_temp_file(&db, id, "bbb", 3).unwrap());

        let files = find_temp_files(&db, id).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].handle, "aaa");
        assert_eq!(files[0].created_at, 1);

        assert_eq!(delete_temp_file(&db, id, "aaa").unwrap(), 1);
        assert_eq!(find_temp_files(&db, id).unwrap().len(), 1);
    }

    #[test]
    fn test_list_for_quiz_newest_first() {
        let db = test_db();
        let mut first = sample_job("first");
        first.created_at = 10;
        insert(&db, &first, &BTreeMap::new(), &[]).unwrap();

        let mut second = sample_job("second");
        second.created_at = 20;
        insert(&db, &second, &BTreeMap::new(), &[]).unwrap();

        let mut other_quiz = sample_job("other");
        other_quiz.quiz_id = 99;
        insert(&db, &other_quiz, &BTreeMap::new(), &[]).unwrap();

        let rows = list_for_quiz(&db, 2, 5, 7).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn test_delete_cascade() {
        let db = test_db();
        let attempts = [AttemptRow {
            attempt_id: 1,
            user_id: 2,
        }];
        let id = insert(&db, &sample_job("gone"), &sample_settings(), &attempts).unwrap();
        insert_temp_file(&db, id, "tmp", 1).unwrap();

        assert_eq!(delete_cascade(&db, id).unwrap(), 1);
        assert!(find_by_id(&db, id).unwrap().is_none());
        assert!(find_settings(&db, id).unwrap().is_empty());
        assert!(find_attempts(&db, id).unwrap().is_empty());
        assert!(find_temp_files(&db, id).unwrap().is_empty());
    }
}
