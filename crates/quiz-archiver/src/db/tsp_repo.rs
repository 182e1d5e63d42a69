//! TSP repository: stored RFC 3161 query/reply pairs in the `job_tsp` table.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A raw TSP row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TspRow {
    pub id: i64,
    pub job_id: i64,
    pub server: String,
    pub created_at: i64,
    pub query: Vec<u8>,
    pub reply: Vec<u8>,
}

/// Inserts a TSP record. Returns the new row id.
pub fn insert(
    db: &Database,
    job_id: i64,
    server: &str,
    created_at: i64,
    query: &[u8],
    reply: &[u8],
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_tsp (job_id, server, created_at, query, reply)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, server, created_at, query, reply],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds the first TSP record of a job.
pub fn find_by_job_id(db: &Database, job_id: i64) -> Result<Option<TspRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT id, job_id, server, created_at, query, reply FROM job_tsp
                 WHERE job_id = ?1 ORDER BY id LIMIT 1",
                params![job_id],
                |r| {
                    Ok(TspRow {
                        id: r.get(0)?,
                        job_id: r.get(1)?,
                        server: r.get(2)?,
                        created_at: r.get(3)?,
                        query: r.get(4)?,
                        reply: r.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Checks whether any TSP record exists for a job.
pub fn exists_for_job(db: &Database, job_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM job_tsp WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Deletes all TSP records of a job. Returns the number of deleted rows.
pub fn delete_for_job(db: &Database, job_id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute("DELETE FROM job_tsp WHERE job_id = ?1", params![job_id])?;
        Ok(n)
    })
}
