use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("rejected write: {0}")]
    Rejected(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// A JSON document on disk guarded by an in-process mutex.
///
/// A missing file reads as `T::default()`. Writes go to a sibling temp file
/// that is renamed over the target, so readers never see a half-written
/// document and a failed write leaves the previous contents in place.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()
    }

    /// Loads, applies `change`, and writes back only when `change` succeeds.
    pub fn update<R>(
        &self,
        change: impl FnOnce(&mut T) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut doc = self.load()?;
        let out = change(&mut doc)?;
        self.save(&doc)?;
        Ok(out)
    }

    fn load(&self) -> Result<T, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, doc: &T) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let rendered = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })?;
        let staging = staging_path(&self.path);
        std::fs::write(&staging, rendered).map_err(io_err)?;
        std::fs::rename(&staging, &self.path).map_err(io_err)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{JsonFile, StoreError};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        items: Vec<String>,
    }

    #[test]
    fn missing_file_reads_as_default() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let file: JsonFile<Doc> = JsonFile::new(temp.path().join("doc.json"));
        assert_eq!(file.read()?, Doc::default());
        Ok(())
    }

    #[test]
    fn update_persists_and_leaves_no_staging_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("doc.json");
        let file: JsonFile<Doc> = JsonFile::new(&path);

        file.update(|doc| {
            doc.items.push("a".to_string());
            Ok(())
        })?;

        let reopened: JsonFile<Doc> = JsonFile::new(&path);
        assert_eq!(reopened.read()?.items, vec!["a".to_string()]);
        assert!(!temp.path().join("nested").join("doc.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn failed_change_does_not_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("doc.json");
        let file: JsonFile<Doc> = JsonFile::new(&path);
        file.update(|doc| {
            doc.items.push("kept".to_string());
            Ok(())
        })?;

        let result: Result<(), StoreError> = file.update(|doc| {
            doc.items.push("dropped".to_string());
            Err(StoreError::Rejected("nope".to_string()))
        });
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(file.read()?.items, vec!["kept".to_string()]);
        Ok(())
    }

    #[test]
    fn corrupt_document_is_a_decode_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("doc.json");
        std::fs::write(&path, "{not json")?;
        let file: JsonFile<Doc> = JsonFile::new(&path);
        assert!(matches!(file.read(), Err(StoreError::Decode { .. })));
        Ok(())
    }
}
