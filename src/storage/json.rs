use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::StorageBackend;

/// The default storage backend: one pretty-printed JSON file per logical
/// record.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStorage;

impl JsonStorage {
    pub fn new() -> Self {
        Self
    }

    fn file_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{}", self.extension()))
    }
}

impl StorageBackend for JsonStorage {
    fn create(&self, dir: &Path, name: &str, data: &serde_json::Value) -> Result<bool> {
        let path = self.file_path(dir, name);
        if path.exists() {
            return Ok(false);
        }
        fs::create_dir_all(dir)?;
        let rendered = serde_json::to_string_pretty(data)?;
        fs::write(&path, rendered).map_err(|_| Error::FileNotWritable(path.clone()))?;
        debug!(file = %path.display(), "created record");
        Ok(true)
    }

    fn read(&self, dir: &Path, name: &str) -> Result<serde_json::Value> {
        let path = self.file_path(dir, name);
        if !path.exists() {
            return Err(Error::FileNotFound(path));
        }
        let contents = fs::read_to_string(&path).map_err(|_| Error::FileNotReadable(path))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, dir: &Path, name: &str, data: &serde_json::Value) -> Result<bool> {
        let path = self.file_path(dir, name);
        if !path.exists() {
            return Err(Error::FileNotFound(path));
        }
        let rendered = serde_json::to_string_pretty(data)?;
        fs::write(&path, rendered).map_err(|_| Error::FileNotWritable(path.clone()))?;
        debug!(file = %path.display(), "saved record");
        Ok(true)
    }

    fn delete(&self, dir: &Path, name: &str) -> Result<bool> {
        let path = self.file_path(dir, name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!(file = %path.display(), "deleted record");
        Ok(true)
    }

    fn has(&self, dir: &Path, name: &str) -> bool {
        self.file_path(dir, name).exists()
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new();

        let data = json!([{"id": 1, "name": "NOEL", "rate": 0.5, "active": true, "note": null}]);
        assert!(storage.create(dir.path(), "user", &data).unwrap());
        assert!(storage.has(dir.path(), "user"));

        let back = storage.read(dir.path(), "user").unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_create_is_noop_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new();

        assert!(storage.create(dir.path(), "user", &json!([])).unwrap());
        assert!(!storage.create(dir.path(), "user", &json!([1])).unwrap());
        // First write intact.
        assert_eq!(storage.read(dir.path(), "user").unwrap(), json!([]));
    }

    #[test]
    fn test_save_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new();

        let err = storage.save(dir.path(), "user", &json!([]));
        assert!(matches!(err, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new();
        assert!(matches!(
            storage.read(dir.path(), "user"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new();

        assert!(!storage.delete(dir.path(), "user").unwrap());
        storage.create(dir.path(), "user", &json!([])).unwrap();
        assert!(storage.delete(dir.path(), "user").unwrap());
        assert!(!storage.has(dir.path(), "user"));
    }
}
