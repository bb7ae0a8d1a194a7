//! JSON array-of-records persistence.
//!
//! Each service keeps its durable state in one pretty-printed JSON array.
//! Loading is forgiving: a missing file is an empty start and a malformed
//! record is skipped with a warning, so one bad entry never costs the rest.
//! Saving rewrites the whole document through a temporary file and a
//! rename, so a crash mid-save leaves the previous version intact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors raised while reading or writing a record file.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must contain a JSON array")]
    NotAnArray { path: PathBuf },
}

/// A JSON file holding an array of `T` records.
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every well-formed record.
    ///
    /// # Errors
    /// Fails only if the file exists but can't be read, isn't JSON, or
    /// isn't an array. Individual bad records are skipped.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, PersistenceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no existing data file, starting fresh");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| {
                PersistenceError::Format {
                    path: self.path.clone(),
                    source,
                }
            })?;
        let serde_json::Value::Array(entries) = value else {
            return Err(PersistenceError::NotAnArray {
                path: self.path.clone(),
            });
        };

        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value(entry) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    index,
                    error = %e,
                    "skipping malformed record"
                ),
            }
        }
        tracing::info!(path = %self.path.display(), count = records.len(), "loaded records");
        Ok(records)
    }

    /// Replaces the file's contents with `records`.
    ///
    /// The document is written to `<path>.tmp` and renamed over `path`, so
    /// readers see either the old array or the new one.
    pub fn save<T: Serialize>(&self, records: &[T]) -> Result<(), PersistenceError> {
        let text = serde_json::to_string_pretty(records).map_err(|source| {
            PersistenceError::Format {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, text).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::info!(path = %self.path.display(), count = records.len(), "saved records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        score: u32,
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecordFile::new(dir.path().join("absent.json"));
        let rows: Vec<Row> = file.load().unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecordFile::new(dir.path().join("rows.json"));
        let rows = vec![
            Row { name: "a".into(), score: 1 },
            Row { name: "b".into(), score: 2 },
        ];

        file.save(&rows).unwrap();
        let loaded: Vec<Row> = file.load().unwrap();
        assert_eq!(loaded, rows);

        let text = fs::read_to_string(file.path()).unwrap();
        assert!(text.contains('\n'), "saved output is pretty-printed");
    }

    #[test]
    fn test_save_over_existing_file_swaps_in_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecordFile::new(dir.path().join("rows.json"));
        file.save(&[Row { name: "old".into(), score: 1 }]).unwrap();

        file.save(&[Row { name: "new".into(), score: 2 }]).unwrap();

        let loaded: Vec<Row> = file.load().unwrap();
        assert_eq!(loaded, vec![Row { name: "new".into(), score: 2 }]);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("rows.json")]);
    }

    #[test]
    fn test_load_skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        fs::write(
            &path,
            r#"[{"name":"ok","score":3},{"name":"bad"},{"name":"ok2","score":4}]"#,
        )
        .unwrap();

        let rows: Vec<Row> = RecordFile::new(&path).load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "ok2");
    }

    #[test]
    fn test_load_non_array_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        fs::write(&path, r#"{"name":"x"}"#).unwrap();

        let result: Result<Vec<Row>, _> = RecordFile::new(&path).load();
        assert!(matches!(result, Err(PersistenceError::NotAnArray { .. })));
    }
}
