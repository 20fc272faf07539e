//! Persisted store abstraction for dependency injection.
//!
//! Everything that must survive a reflash (backups, the backup index, the
//! shutdown copy of the template) goes through the [`Store`] trait.
//! Production code uses [`FsStore`] rooted at the persist directory; tests
//! use [`MemoryStore`].
use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::resources::helpers::fs::write_atomic;

/// Metadata about one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Slash-separated key.
    pub key: String,
    /// Last write time.
    pub modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

/// Key-value storage addressed by slash-separated keys.
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Read the object at `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the object cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write the object at `key`. The write is atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Entries whose key starts with `prefix`, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>>;

    /// Remove the object at `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or removal fails.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry under `prefix` last written before `cutoff`.
    /// Returns the removed keys.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or removal fails.
    fn delete_older_than(&self, prefix: &str, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in self.list(prefix)? {
            if entry.modified < cutoff && self.delete(&entry.key)? {
                removed.push(entry.key);
            }
        }
        Ok(removed)
    }

    /// Filesystem location of `key`, for stores that have one.
    fn locate(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

fn check_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    if key.is_empty()
        || path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        bail!("invalid store key: {key:?}");
    }
    Ok(())
}

/// [`Store`] backed by a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root` (usually the persist directory).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory this store writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<StoreEntry>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading directory {}", dir.display()));
            }
        };
        for entry in entries {
            let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
            let path = entry.path();
            let meta = entry
                .metadata()
                .with_context(|| format!("stat {}", path.display()))?;
            if meta.is_dir() {
                self.walk(&path, out)?;
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "new") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let modified = meta
                .modified()
                .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
            out.push(StoreEntry {
                key,
                modified,
                size: meta.len(),
            });
        }
        Ok(())
    }
}

impl Store for FsStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, bytes)
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        let mut out = Vec::new();
        self.walk(&self.root, &mut out)?;
        out.retain(|e| e.key.starts_with(prefix));
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    fn locate(&self, key: &str) -> Option<PathBuf> {
        self.path_for(key).ok()
    }
}

/// In-memory [`Store`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `key` with an explicit modification time.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid.
    pub fn put_at(&self, key: &str, bytes: &[u8], at: DateTime<Utc>) -> Result<()> {
        check_key(key)?;
        self.lock()?.insert(key.to_string(), (bytes.to_vec(), at));
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>> {
        self.objects
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.lock()?.get(key).map(|(bytes, _)| bytes.clone()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.put_at(key, bytes, Utc::now())
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoreEntry>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (bytes, modified))| StoreEntry {
                key: key.clone(),
                modified: *modified,
                size: bytes.len() as u64,
            })
            .collect())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.lock()?.remove(key).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn exercise(store: &dyn Store) {
        assert_eq!(store.get("backups/a.sh").unwrap(), None);
        store.put("backups/a.sh", b"one").unwrap();
        store.put("backups/b.sh", b"two").unwrap();
        store.put("template.sh", b"tpl").unwrap();

        assert_eq!(store.get("backups/a.sh").unwrap().unwrap(), b"one");
        let keys: Vec<_> = store
            .list("backups/")
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, ["backups/a.sh", "backups/b.sh"]);

        assert!(store.delete("backups/a.sh").unwrap());
        assert!(!store.delete("backups/a.sh").unwrap());
        assert_eq!(store.list("").unwrap().len(), 2);
    }

    #[test]
    fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        exercise(&store);
        assert_eq!(
            store.locate("template.sh"),
            Some(dir.path().join("template.sh"))
        );
    }

    #[test]
    fn memory_store_round_trip() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.put("../evil", b"x").is_err());
        assert!(store.put("/etc/passwd", b"x").is_err());
        assert!(store.get("").is_err());
        assert!(MemoryStore::new().put("a/../b", b"x").is_err());
    }

    #[test]
    fn fs_store_lists_missing_root_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("not-yet"));
        assert!(store.list("").unwrap().is_empty());
    }

    #[test]
    fn delete_older_than_respects_cutoff_and_prefix() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.put_at("backups/old.sh", b"o", now - Duration::days(40)).unwrap();
        store.put_at("backups/new.sh", b"n", now).unwrap();
        store.put_at("template.sh", b"t", now - Duration::days(40)).unwrap();

        let removed = store
            .delete_older_than("backups/", now - Duration::days(30))
            .unwrap();
        assert_eq!(removed, ["backups/old.sh"]);
        assert!(store.get("template.sh").unwrap().is_some());
    }
}
