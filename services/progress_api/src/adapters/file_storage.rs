//! services/progress_api/src/adapters/file_storage.rs
//!
//! Device-local storage for the progress ledger. Each key is kept as one JSON
//! file under the data directory and replaced atomically on every write.

use manga_progress_core::ports::{KeyValueStorage, StorageError};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// ENOSPC / EDQUOT on Linux.
const OUT_OF_SPACE_CODES: [i32; 2] = [28, 122];

/// A `KeyValueStorage` backed by one file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates the storage, making sure the directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;
        tracing::debug!(dir = %dir.display(), "file storage ready");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Unavailable(format!("invalid storage key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        let result = write_synced(&tmp_path, value).and_then(|()| fs::rename(&tmp_path, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(storage_error(&path, e));
        }
        Ok(())
    }
}

fn write_synced(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

fn storage_error(path: &Path, e: std::io::Error) -> StorageError {
    if e.raw_os_error().is_some_and(|code| OUT_OF_SPACE_CODES.contains(&code)) {
        return StorageError::QuotaExceeded;
    }
    match e.kind() {
        ErrorKind::PermissionDenied => {
            StorageError::Unavailable(format!("{}: {}", path.display(), e))
        }
        _ => StorageError::Io(format!("{}: {}", path.display(), e)),
    }
}
