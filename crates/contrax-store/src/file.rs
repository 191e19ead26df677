//! File-backed storage: a single JSON object of string values.
//!
//! Every write replaces the file atomically (temp file in the same directory,
//! then rename), so a crash mid-write never leaves a truncated session.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{LocalStorage, StoreError};

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl FileStorage {
    /// Open storage at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.io_err(e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec_pretty(map)?;
        tmp.write_all(&json).map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        debug!(path = %self.path.display(), keys = map.len(), "credential file written");
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StoreError> {
        let _lock = self
            .guard
            .lock()
            .map_err(|_| StoreError::Other("file storage lock poisoned".into()))?;
        let mut map = self.read_map()?;
        if f(&mut map) {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.modify(|map| map.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("session.json"));
        assert_eq!(store.get("access_token").unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        FileStorage::open(&path).set("access_token", "abc").unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get("access_token").unwrap().as_deref(), Some("abc"));

        reopened.remove("access_token").unwrap();
        assert_eq!(FileStorage::open(&path).get("access_token").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileStorage::open(&path).set("k", "v").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn garbage_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileStorage::open(&path).get("k").unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }
}
