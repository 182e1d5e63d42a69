use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{is_valid_handle, sha256_hex, FileRef, FileStore, StoredFile};
use crate::error::StorageError;

/// File store laid out as `<root>/<area>/<first two hex chars>/<handle>`.
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, area: &str, handle: &str) -> PathBuf {
        self.root.join(area).join(&handle[..2]).join(handle)
    }

    /// Finds the file behind a handle in any area.
    fn locate(&self, handle: &str) -> Result<Option<PathBuf>, StorageError> {
        if !is_valid_handle(handle) {
            return Err(StorageError::InvalidHandle(handle.to_string()));
        }
        if !self.root.exists() {
            return Ok(None);
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| StorageError::ScanDirectory {
            path: self.root.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let candidate = entry.path().join(&handle[..2]).join(handle);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl FileStore for FsFileStore {
    fn store(&self, file: &FileRef, content: &[u8]) -> Result<StoredFile, StorageError> {
        if file.area.is_empty() || file.area.contains(['/', '\\', '.']) {
            return Err(StorageError::InvalidHandle(format!(
                "invalid area '{}'",
                file.area
            )));
        }

        let handle = file.handle();
        let target = self.path_for(&file.area, &handle);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_directory(&dir)?;

        // Write next to the target, then rename so readers never see partial content.
        let staging = dir.join(format!(".{}.{}.tmp", handle, std::process::id()));
        let mut staged = std::fs::File::create(&staging).map_err(|e| StorageError::WriteFile {
            path: staging.clone(),
            source: e,
        })?;
        staged
            .write_all(content)
            .and_then(|_| staged.sync_all())
            .map_err(|e| StorageError::WriteFile {
                path: staging.clone(),
                source: e,
            })?;
        drop(staged);

        std::fs::rename(&staging, &target).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;

        log::debug!("Stored {} ({} bytes)", file.pathname(), content.len());

        Ok(StoredFile {
            handle,
            content_hash: sha256_hex(content),
            size: content.len() as u64,
        })
    }

    fn resolve(&self, handle: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.locate(handle)? {
            Some(path) => {
                let content =
                    std::fs::read(&path).map_err(|e| StorageError::ReadFile { path, source: e })?;
                Ok(Some(content))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, handle: &str) -> Result<bool, StorageError> {
        match self.locate(handle)? {
            Some(path) => match std::fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StorageError::DeleteFile { path, source: e }),
            },
            None => Ok(false),
        }
    }

    fn purge_area(&self, area: &str, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        let area_dir = self.root.join(area);
        if !area_dir.is_dir() {
            return Ok(0);
        }

        let scan_error = |path: &Path, e: std::io::Error| StorageError::ScanDirectory {
            path: path.to_path_buf(),
            source: e,
        };

        let mut purged = 0;
        for bucket in std::fs::read_dir(&area_dir)
            .map_err(|e| scan_error(&area_dir, e))?
            .flatten()
        {
            let bucket_path = bucket.path();
            if !bucket_path.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&bucket_path)
                .map_err(|e| scan_error(&bucket_path, e))?
                .flatten()
            {
                let path = entry.path();
                let modified = match entry.metadata().and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                if modified >= older_than {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => purged += 1,
                    Err(e) => log::warn!("Failed to purge {}: {}", path.display(), e),
                }
            }
        }

        Ok(purged)
    }
}
