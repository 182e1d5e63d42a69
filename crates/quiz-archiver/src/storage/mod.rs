//! Content-addressed file storage for artifacts and temporary files.
//!
//! Jobs only ever hold handles into a [`FileStore`]. A handle is the SHA-256
//! of a file's pathname, so it is known before the bytes are written and can
//! be linked to a job ahead of the upload.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

pub mod filesystem;

pub use filesystem::FsFileStore;

/// Area for finished archive artifacts.
pub const ARTIFACT_AREA: &str = "artifact";

/// Scratch area for intermediate files. Subject to age-based purging.
pub const TEMP_AREA: &str = "temp";

/// Location of a file inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub area: String,
    pub item_id: i64,
    pub path: String,
    pub filename: String,
}

impl FileRef {
    pub fn new(area: &str, item_id: i64, path: &str, filename: &str) -> Self {
        Self {
            area: area.to_string(),
            item_id,
            path: path.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Full pathname, e.g. `/artifact/12/attempts/report.tar.gz`.
    pub fn pathname(&self) -> String {
        let mut path = self.path.trim_matches('/').to_string();
        if !path.is_empty() {
            path.push('/');
        }
        format!("/{}/{}/{}{}", self.area, self.item_id, path, self.filename)
    }

    /// The deterministic handle of this file: hex SHA-256 of [`Self::pathname`].
    pub fn handle(&self) -> String {
        sha256_hex(self.pathname().as_bytes())
    }
}

/// Metadata of a file that was written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub handle: String,
    /// Hex SHA-256 of the content.
    pub content_hash: String,
    pub size: u64,
}

/// The external file store collaborator.
pub trait FileStore: Send + Sync {
    /// Writes `content` at `file`, replacing any previous content.
    fn store(&self, file: &FileRef, content: &[u8]) -> Result<StoredFile, StorageError>;

    /// Returns the content behind `handle`, or `None` if it does not resolve.
    fn resolve(&self, handle: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Deletes the content behind `handle`. Returns false if nothing was stored.
    fn delete(&self, handle: &str) -> Result<bool, StorageError>;

    /// Deletes every file in `area` last written before `older_than`.
    /// Returns the number of deleted files.
    fn purge_area(&self, area: &str, older_than: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// A handle is a lowercase hex SHA-256 digest.
pub fn is_valid_handle(handle: &str) -> bool {
    handle.len() == 64
        && handle
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
