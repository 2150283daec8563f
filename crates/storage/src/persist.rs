//! JSON snapshot persistence
//!
//! Snapshots are written to a temporary sibling and renamed into place so a
//! crash mid-write never leaves a truncated file behind.

use crate::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Load a snapshot. A missing file is `Ok(None)`; unknown fields are ignored.
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No snapshot at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(StorageError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| StorageError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Write a snapshot as pretty-printed JSON
pub fn save_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_err = |e: std::io::Error| StorageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;

    debug!("Saved snapshot to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        value: u32,
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<BTreeMap<String, Entry>> =
            load_snapshot(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_round_trip_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Entry { value: 7 });
        save_snapshot(&path, &map).unwrap();

        let loaded: BTreeMap<String, Entry> = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded, map);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"a": {"value": 3, "added_later": true}}"#).unwrap();

        let loaded: BTreeMap<String, Entry> = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded["a"], Entry { value: 3 });
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let result: Result<Option<BTreeMap<String, Entry>>, _> = load_snapshot(&path);
        assert!(matches!(result, Err(StorageError::Serialization { .. })));
    }
}
