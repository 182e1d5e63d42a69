//! Access token repository: the shared credential store in `access_tokens`.

use rusqlite::params;

use super::{Database, DatabaseError};

/// Records an issued token.
pub fn insert(
    db: &Database,
    token: &str,
    user_id: i64,
    created_at: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO access_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, created_at],
        )?;
        Ok(())
    })
}

/// Checks whether a token is currently recorded.
pub fn exists(db: &Database, token: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM access_tokens WHERE token = ?1",
            params![token],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Deletes a token. Returns the number of deleted rows.
pub fn delete(db: &Database, token: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute("DELETE FROM access_tokens WHERE token = ?1", params![token])?;
        Ok(n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_exists_delete() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, "abc", 7, 0).unwrap();
        assert!(exists(&db, "abc").unwrap());
        assert!(!exists(&db, "xyz").unwrap());

        assert_eq!(delete(&db, "abc").unwrap(), 1);
        assert_eq!(delete(&db, "abc").unwrap(), 0);
        assert!(!exists(&db, "abc").unwrap());
    }
}
