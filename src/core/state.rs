//! Durable pool state on local disk.
//!
//! The store owns two kinds of files under the pool root:
//! `state.json`, mapping each active alloc id to its resource vector,
//! and `allocs/<id>/meta.json`, the metadata written when an alloc is
//! configured and read back when it is restored after a restart.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::core::alloc::AllocMeta;
use crate::core::error::PoolError;
use crate::core::resources::Resources;

const STATE_FILE: &str = "state.json";
const META_FILE: &str = "meta.json";
const ALLOCS_DIR: &str = "allocs";

/// Atomic load/save of the alloc roster, plus per-alloc metadata files.
#[derive(Debug, Clone)]
pub struct StateStore {
    prefix: PathBuf,
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `<prefix>/<dir>`. `prefix` permits running
    /// the pool manager inside a container whose mounts shift the root.
    pub fn new(prefix: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            dir: dir.into(),
        }
    }

    /// The pool root, `<prefix>/<dir>`.
    pub fn root(&self) -> PathBuf {
        self.prefix.join(&self.dir)
    }

    /// The directory holding one subdirectory per alloc.
    pub fn allocs_dir(&self) -> PathBuf {
        self.root().join(ALLOCS_DIR)
    }

    /// The root directory owned by the alloc with `id`.
    pub fn alloc_dir(&self, id: &str) -> PathBuf {
        self.allocs_dir().join(id)
    }

    /// Creates the pool root and allocs directory.
    pub fn ensure_layout(&self) -> Result<(), PoolError> {
        fs::create_dir_all(self.allocs_dir())?;
        Ok(())
    }

    /// Writes `state.json` atomically via create-and-rename. An encoding
    /// failure removes the partial file and surfaces the error.
    pub fn save(&self, roster: &HashMap<String, Resources>) -> Result<(), PoolError> {
        let path = self.root().join(STATE_FILE);
        let tmp = self.root().join(format!("{STATE_FILE}.tmp"));
        let file = File::create(&tmp)?;
        if let Err(err) = serde_json::to_writer(&file, roster) {
            drop(file);
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Reads `state.json`. A missing file yields an empty roster; a file
    /// that fails to decode is logged and treated as empty so a damaged
    /// host can still come back up.
    pub fn load(&self) -> Result<HashMap<String, Resources>, PoolError> {
        let path = self.root().join(STATE_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no state on disk");
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_reader(file) {
            Ok(roster) => Ok(roster),
            Err(err) => {
                tracing::error!(%err, "failed to recover state; starting from empty");
                Ok(HashMap::new())
            }
        }
    }

    /// Writes `meta.json` for `id`, creating the alloc directory.
    pub fn save_meta(&self, id: &str, meta: &AllocMeta) -> Result<(), PoolError> {
        let dir = self.alloc_dir(id);
        fs::create_dir_all(&dir)?;
        let file = File::create(dir.join(META_FILE))?;
        serde_json::to_writer(&file, meta)?;
        Ok(())
    }

    /// Reads `meta.json` for `id`.
    pub fn load_meta(&self, id: &str) -> Result<AllocMeta, PoolError> {
        let file = File::open(self.alloc_dir(id).join(META_FILE))?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Whether the alloc directory for `id` exists on disk.
    pub fn alloc_dir_exists(&self, id: &str) -> bool {
        self.alloc_dir(id).is_dir()
    }
}

/// Lists the alloc ids that have a directory under `allocs/`.
pub(crate) fn list_alloc_dirs(path: &Path) -> Result<Vec<String>, PoolError> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(pairs: &[(&str, f64)]) -> Resources {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path(), "pool");
        store.ensure_layout().unwrap();
        let mut roster = HashMap::new();
        roster.insert("a1b2".to_string(), res(&[("mem", 5.0), ("cpu", 1.0)]));
        store.save(&roster).unwrap();
        assert_eq!(store.load().unwrap(), roster);
        assert!(!store.root().join("state.json.tmp").exists());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path(), "pool");
        store.ensure_layout().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path(), "pool");
        store.ensure_layout().unwrap();
        fs::write(store.root().join(STATE_FILE), b"{not json").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_meta_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path(), "pool");
        store.ensure_layout().unwrap();
        let meta = AllocMeta::new(res(&[("mem", 5.0)]), "job-7");
        store.save_meta("a1b2", &meta).unwrap();
        let loaded = store.load_meta("a1b2").unwrap();
        assert_eq!(loaded.want, meta.want);
        assert_eq!(loaded.name, "job-7");
        assert!(store.alloc_dir_exists("a1b2"));
        assert!(!store.alloc_dir_exists("ffff"));
    }

    #[test]
    fn test_missing_meta_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path(), "pool");
        store.ensure_layout().unwrap();
        fs::create_dir_all(store.alloc_dir("a1b2")).unwrap();
        let err = store.load_meta("a1b2").unwrap_err();
        assert!(err.is_not_found());
    }
}
