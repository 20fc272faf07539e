//! Versioned snapshots of the live config, the template and the crontab.
//!
//! Snapshots live in the [`Store`] under `backups/<kind>/` and are recorded
//! in `backups/index.json` with their SHA-256 digest, so a restore can refuse
//! content that changed after capture. Each kind is a bounded ring pruned
//! oldest first.
//!
//! With compression enabled the stored objects are gzip streams
//! (`.bak.gz`); digests and sizes always describe the uncompressed content.
use chrono::{DateTime, TimeDelta, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::validation::Validator;
use crate::error::BackupError;
use crate::resources::helpers::fs::{promote, tmp_path, write_atomic};
use crate::store::Store;

/// Key of the backup index inside the store.
pub const INDEX_KEY: &str = "backups/index.json";

const QUARANTINE_PREFIX: &str = "backups/quarantine/";

/// What a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// The live configuration; validated before capture.
    Config,
    /// The template of the installed release.
    Template,
    /// The crontab.
    Schedule,
}

impl BackupKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 3] = [Self::Config, Self::Template, Self::Schedule];

    /// Lowercase name, also used as the store directory.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Template => "template",
            Self::Schedule => "schedule",
        }
    }

    fn prefix(self) -> String {
        format!("backups/{}/", self.as_str())
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown backup kind: {s}"))
    }
}

/// A recorded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHandle {
    /// Store key of the snapshot content.
    pub key: String,
    /// What was captured.
    pub kind: BackupKind,
    /// Capture time.
    pub created: DateTime<Utc>,
    /// Hex SHA-256 of the content at capture.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// File the snapshot was taken from.
    pub source: PathBuf,
    /// Monotonic sequence number across all kinds.
    pub seq: u64,
    /// Why the snapshot was taken.
    #[serde(default)]
    pub description: String,
    /// Whether the stored object is gzip-compressed.
    #[serde(default)]
    pub compressed: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackupIndex {
    next_seq: u64,
    backups: Vec<BackupHandle>,
}

/// Hex-encoded SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

/// Oldest creation time kept by an age prune of `max_age_days`.
///
/// `None` when the age reaches past the representable range.
#[must_use]
pub fn age_cutoff(max_age_days: u64) -> Option<DateTime<Utc>> {
    i64::try_from(max_age_days)
        .ok()
        .and_then(TimeDelta::try_days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
}

/// Captures, restores and prunes snapshots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    store: Arc<dyn Store>,
    validator: Validator,
    compress: bool,
}

impl BackupManager {
    /// Manager writing into `store`, gating config snapshots with `validator`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, validator: Validator) -> Self {
        Self {
            store,
            validator,
            compress: false,
        }
    }

    /// Gzip new snapshots. Existing snapshots are read either way.
    #[must_use]
    pub const fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Where a stored object lives, for operator messages.
    #[must_use]
    pub fn location(&self, key: &str) -> String {
        self.store
            .locate(key)
            .map_or_else(|| format!("store:{key}"), |p| p.display().to_string())
    }

    /// Capture `path` as a snapshot of `kind`, recording `description`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::SourceMissing`] if `path` does not exist,
    /// [`BackupError::RefusedInvalid`] if a config snapshot fails validation,
    /// and [`BackupError::Storage`] if the store cannot be written.
    pub fn snapshot(
        &self,
        kind: BackupKind,
        path: &Path,
        description: &str,
    ) -> Result<BackupHandle, BackupError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::SourceMissing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(BackupError::Storage(
                    anyhow::Error::new(e).context(format!("reading {}", path.display())),
                ));
            }
        };

        if kind == BackupKind::Config {
            let report = self.validator.validate(path);
            if !report.ok {
                return Err(BackupError::RefusedInvalid {
                    path: path.to_path_buf(),
                    reasons: report.reasons,
                });
            }
        }

        let mut index = self.load_index()?;
        let created = Utc::now();
        let seq = index.next_seq;
        let key = format!(
            "{}{seq:06}-{}.bak{}",
            kind.prefix(),
            created.format("%Y%m%dT%H%M%SZ"),
            if self.compress { ".gz" } else { "" }
        );
        self.store.put(&key, &self.encode(&bytes)?)?;

        let handle = BackupHandle {
            key,
            kind,
            created,
            sha256: sha256_hex(&bytes),
            size: bytes.len() as u64,
            source: path.to_path_buf(),
            seq,
            description: description.to_string(),
            compressed: self.compress,
        };
        index.next_seq = seq + 1;
        index.backups.push(handle.clone());
        self.save_index(&index)?;

        tracing::info!(
            "backed up {} to {}",
            path.display(),
            self.location(&handle.key)
        );
        Ok(handle)
    }

    /// Restore `handle` over the file it was taken from.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::restore_to`].
    pub fn restore(&self, handle: &BackupHandle) -> Result<(), BackupError> {
        self.restore_to(handle, &handle.source)
    }

    /// Restore `handle` to `dest`, atomically.
    ///
    /// The stored bytes must match the digest recorded at capture. A config
    /// snapshot is validated again in its staged location before it replaces
    /// `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] if the content is gone,
    /// [`BackupError::IntegrityMismatch`] if it was altered,
    /// [`BackupError::RefusedInvalid`] if it no longer validates, and
    /// [`BackupError::Storage`] on I/O failure. `dest` is untouched on error.
    pub fn restore_to(&self, handle: &BackupHandle, dest: &Path) -> Result<(), BackupError> {
        self.restore_with(handle, dest, |bytes| bytes)
    }

    /// Like [`BackupManager::restore_to`], passing the verified content
    /// through `rewrite` before it is staged and validated.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::restore_to`].
    pub fn restore_with(
        &self,
        handle: &BackupHandle,
        dest: &Path,
        rewrite: impl FnOnce(Vec<u8>) -> Vec<u8>,
    ) -> Result<(), BackupError> {
        let bytes = rewrite(self.read_verified(handle)?);

        if handle.kind != BackupKind::Config {
            write_atomic(dest, &bytes)?;
            tracing::info!("restored {} to {}", handle.key, dest.display());
            return Ok(());
        }

        let staged = tmp_path(dest);
        write_atomic(&staged, &bytes)?;
        let report = self.validator.validate(&staged);
        if !report.ok {
            let _ = std::fs::remove_file(&staged);
            return Err(BackupError::RefusedInvalid {
                path: dest.to_path_buf(),
                reasons: report.reasons,
            });
        }
        promote(&staged, dest)?;
        tracing::info!("restored {} to {}", handle.key, dest.display());
        Ok(())
    }

    /// Uncompressed content of `handle`, checked against its digest.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] if the content is gone and
    /// [`BackupError::IntegrityMismatch`] if it was altered or cannot be
    /// decompressed.
    pub fn read_verified(&self, handle: &BackupHandle) -> Result<Vec<u8>, BackupError> {
        let stored = self
            .store
            .get(&handle.key)?
            .ok_or_else(|| BackupError::NotFound(handle.key.clone()))?;
        let bytes = decode(handle, stored)?;
        let actual = sha256_hex(&bytes);
        if actual != handle.sha256 {
            return Err(BackupError::IntegrityMismatch {
                key: handle.key.clone(),
                expected: handle.sha256.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Restore the newest config snapshot that still restores cleanly,
    /// passing its content through `rewrite` first.
    ///
    /// Snapshots that are missing, altered, or no longer valid are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the index cannot be read.
    pub fn restore_latest_valid(
        &self,
        dest: &Path,
        rewrite: impl Fn(Vec<u8>) -> Vec<u8>,
    ) -> Result<Option<BackupHandle>, BackupError> {
        let mut candidates = self.list(Some(BackupKind::Config))?;
        candidates.reverse();
        for handle in candidates {
            match self.restore_with(&handle, dest, &rewrite) {
                Ok(()) => return Ok(Some(handle)),
                Err(e) => tracing::warn!("skipping backup {}: {e}", handle.key),
            }
        }
        Ok(None)
    }

    /// Snapshots of `kind` (or every kind), oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn list(&self, kind: Option<BackupKind>) -> Result<Vec<BackupHandle>, BackupError> {
        let mut backups: Vec<BackupHandle> = self
            .load_index()?
            .backups
            .into_iter()
            .filter(|h| kind.is_none_or(|k| h.kind == k))
            .collect();
        backups.sort_by_key(|h| h.seq);
        Ok(backups)
    }

    /// Newest snapshot of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn latest(&self, kind: BackupKind) -> Result<Option<BackupHandle>, BackupError> {
        Ok(self.list(Some(kind))?.pop())
    }

    /// Snapshot recorded under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] if no such snapshot is recorded.
    pub fn find(&self, key: &str) -> Result<BackupHandle, BackupError> {
        self.load_index()?
            .backups
            .into_iter()
            .find(|h| h.key == key)
            .ok_or_else(|| BackupError::NotFound(key.to_string()))
    }

    /// Keep the newest `retain` snapshots of `kind`; return the removed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or index cannot be updated.
    pub fn prune(&self, kind: BackupKind, retain: usize) -> Result<Vec<BackupHandle>, BackupError> {
        let mut index = self.load_index()?;
        index.backups.sort_by_key(|h| h.seq);
        let total = index.backups.iter().filter(|h| h.kind == kind).count();
        let mut excess = total.saturating_sub(retain);

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(index.backups.len());
        for handle in index.backups {
            if excess > 0 && handle.kind == kind {
                excess -= 1;
                removed.push(handle);
            } else {
                kept.push(handle);
            }
        }
        index.backups = kept;
        self.drop_content(&removed)?;
        self.save_index(&index)?;
        Ok(removed)
    }

    /// Remove snapshots created before `cutoff`, always keeping the newest of
    /// each kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or index cannot be updated.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupHandle>, BackupError> {
        let mut index = self.load_index()?;
        let newest: Vec<u64> = BackupKind::ALL
            .into_iter()
            .filter_map(|k| {
                index
                    .backups
                    .iter()
                    .filter(|h| h.kind == k)
                    .map(|h| h.seq)
                    .max()
            })
            .collect();

        let (removed, kept): (Vec<_>, Vec<_>) = index
            .backups
            .into_iter()
            .partition(|h| h.created < cutoff && !newest.contains(&h.seq));
        index.backups = kept;
        self.drop_content(&removed)?;
        self.save_index(&index)?;

        let stale_quarantine = self.store.delete_older_than(QUARANTINE_PREFIX, cutoff)?;
        if !stale_quarantine.is_empty() {
            tracing::debug!("removed {} quarantined file(s)", stale_quarantine.len());
        }
        Ok(removed)
    }

    /// Copy `path` raw into the quarantine area and return where it went.
    ///
    /// Quarantined files are never restored automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be read or the store cannot be written.
    pub fn quarantine(&self, path: &Path) -> Result<String, BackupError> {
        let bytes = std::fs::read(path).map_err(|e| {
            BackupError::Storage(anyhow::Error::new(e).context(format!("reading {}", path.display())))
        })?;
        let name = path
            .file_name()
            .map_or_else(|| "config".into(), |n| n.to_string_lossy());
        let key = format!(
            "{QUARANTINE_PREFIX}{}-{name}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        );
        self.store.put(&key, &bytes)?;
        let location = self.location(&key);
        tracing::warn!("quarantined {} at {location}", path.display());
        Ok(location)
    }

    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, BackupError> {
        if !self.compress {
            return Ok(bytes.to_vec());
        }
        let compressing =
            |e: std::io::Error| BackupError::Storage(anyhow::Error::new(e).context("compressing snapshot"));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).map_err(compressing)?;
        encoder.finish().map_err(compressing)
    }

    fn drop_content(&self, handles: &[BackupHandle]) -> Result<(), BackupError> {
        for handle in handles {
            self.store.delete(&handle.key)?;
            tracing::debug!("pruned backup {}", handle.key);
        }
        Ok(())
    }

    fn load_index(&self) -> Result<BackupIndex, BackupError> {
        let Some(bytes) = self.store.get(INDEX_KEY)? else {
            return Ok(BackupIndex::default());
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(index),
            Err(e) => {
                tracing::warn!("backup index unreadable ({e}); rebuilding from stored files");
                self.rebuild_index()
            }
        }
    }

    /// Reconstruct the index from the keys in the store.
    ///
    /// Keys carry kind and sequence (`backups/<kind>/<seq>-<time>.bak[.gz]`);
    /// the digest is recomputed and the source path and description are lost.
    fn rebuild_index(&self) -> Result<BackupIndex, BackupError> {
        let mut index = BackupIndex::default();
        for kind in BackupKind::ALL {
            for entry in self.store.list(&kind.prefix())? {
                let Some(seq) = entry
                    .key
                    .strip_prefix(&kind.prefix())
                    .and_then(|rest| rest.split('-').next())
                    .and_then(|n| n.parse::<u64>().ok())
                else {
                    continue;
                };
                let Some(stored) = self.store.get(&entry.key)? else {
                    continue;
                };
                let compressed = entry.key.ends_with(".gz");
                let bytes = if compressed {
                    let mut out = Vec::new();
                    if let Err(e) = GzDecoder::new(stored.as_slice()).read_to_end(&mut out) {
                        tracing::warn!("skipping undecodable backup {}: {e}", entry.key);
                        continue;
                    }
                    out
                } else {
                    stored
                };
                index.next_seq = index.next_seq.max(seq + 1);
                index.backups.push(BackupHandle {
                    key: entry.key,
                    kind,
                    created: entry.modified,
                    sha256: sha256_hex(&bytes),
                    size: bytes.len() as u64,
                    source: PathBuf::new(),
                    seq,
                    description: String::new(),
                    compressed,
                });
            }
        }
        Ok(index)
    }

    fn save_index(&self, index: &BackupIndex) -> Result<(), BackupError> {
        let json = serde_json::to_vec_pretty(index)
            .map_err(|e| BackupError::Storage(anyhow::Error::new(e).context("encoding backup index")))?;
        self.store.put(INDEX_KEY, &json)?;
        Ok(())
    }
}

/// Undo the compression recorded in `handle`. A stream that does not decode
/// counts as altered content.
fn decode(handle: &BackupHandle, stored: Vec<u8>) -> Result<Vec<u8>, BackupError> {
    if !handle.compressed {
        return Ok(stored);
    }
    let mut out = Vec::new();
    match GzDecoder::new(stored.as_slice()).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(e) => {
            tracing::warn!("backup {} does not decompress: {e}", handle.key);
            Err(BackupError::IntegrityMismatch {
                key: handle.key.clone(),
                expected: handle.sha256.clone(),
                actual: sha256_hex(&stored),
            })
        }
    }
}
