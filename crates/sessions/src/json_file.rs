//! A `HashMap<String, V>` kept in memory and mirrored to one JSON file.
//!
//! Reads never touch disk.  Writes are serialized, applied to a copy of
//! the map, written to disk (temp file + rename), and only then published
//! to readers, so memory never holds state that failed to persist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cr_domain::error::{Error, Result};

pub(crate) struct JsonMapFile<V> {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, V>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<V> JsonMapFile<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Load `path` if it exists, creating its parent directory otherwise.
    pub(crate) fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;
        }

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| persistence(&path, e))?;
            serde_json::from_str(&raw).map_err(|e| {
                Error::Persistence(format!("parsing {}: {e}", path.display()))
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub(crate) fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<V> {
        self.entries.read().get(id).cloned()
    }

    /// All values matching `pred`.
    pub(crate) fn filter(&self, pred: impl Fn(&V) -> bool) -> Vec<V> {
        self.entries
            .read()
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect()
    }

    /// Apply `f` to a copy of the map and persist it.  On any error the
    /// visible map is left unchanged.
    pub(crate) async fn write<R: Send>(
        &self,
        f: impl FnOnce(&mut HashMap<String, V>) -> Result<R> + Send,
    ) -> Result<R> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.entries.read().clone();
        let out = f(&mut next)?;

        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&next)
                .map_err(|e| Error::Persistence(format!("serializing {}: {e}", path.display())))?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, json)
                .await
                .map_err(|e| persistence(&tmp, e))?;
            tokio::fs::rename(&tmp, path)
                .await
                .map_err(|e| persistence(path, e))?;
        }

        *self.entries.write() = next;
        Ok(out)
    }
}

fn persistence(path: &Path, e: std::io::Error) -> Error {
    Error::Persistence(format!("{}: {e}", path.display()))
}
