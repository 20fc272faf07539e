//! Domain-specific error types for the installer.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`],
//! [`BackupError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! InstallerError
//! ├── Config(ConfigError)      settings, template and live config I/O
//! ├── Merge(MergeError)        per-entry diagnostics from extraction
//! ├── Backup(BackupError)      snapshot, restore, prune
//! ├── Download(DownloadError)  ordered source/transport fallbacks
//! └── Recovery(RecoveryError)  boot-time reinstall and activation
//! ```
//!
//! Every variant maps onto one [`ErrorKind`] so callers can decide between
//! aborting, retrying, falling back, or carrying on.

use std::path::PathBuf;

use thiserror::Error;

/// Failure classes that drive how a caller reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition failed before anything was mutated; abort.
    FatalPrecondition,
    /// A network operation failed; try the next fallback.
    TransientNetworkFailure,
    /// A configuration failed validation; never activate it.
    ConfigCorruption,
    /// A single malformed entry; skip it and carry on.
    MergeInconsistency,
    /// Every automated recovery path is exhausted.
    RecoveryFailed,
}

/// Top-level error type for the installer.
#[derive(Error, Debug)]
pub enum InstallerError {
    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A malformed entry encountered while merging.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Backup or restore error.
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// Download error.
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Recovery orchestration error.
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),
}

impl InstallerError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(e) => e.kind(),
            Self::Merge(_) => ErrorKind::MergeInconsistency,
            Self::Backup(e) => e.kind(),
            Self::Download(_) => ErrorKind::TransientNetworkFailure,
            Self::Recovery(_) => ErrorKind::RecoveryFailed,
        }
    }
}

/// Errors that arise from loading settings, templates and live configs.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The template could not be read; nothing was mutated.
    #[error("template unreadable at {path}: {source}")]
    TemplateUnreadable {
        /// Path of the template.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The persisted store directory cannot be written.
    #[error("persisted store not writable at {path}: {reason}")]
    StoreNotWritable {
        /// Store directory.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// The settings file exists but is not valid TOML for [`crate::config::Settings`].
    #[error("invalid settings in {path}: {message}")]
    InvalidSettings {
        /// Settings file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A configuration candidate failed validation.
    #[error("configuration {path} failed validation: {}", reasons.join("; "))]
    Invalid {
        /// The rejected file.
        path: PathBuf,
        /// Every failing check.
        reasons: Vec<String>,
    },

    /// An I/O error occurred while reading or writing a config file.
    #[error("IO error on config file {path}: {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TemplateUnreadable { .. }
            | Self::StoreNotWritable { .. }
            | Self::InvalidSettings { .. }
            | Self::Io { .. } => ErrorKind::FatalPrecondition,
            Self::Invalid { .. } => ErrorKind::ConfigCorruption,
        }
    }
}

/// A single configuration line that could not be used.
///
/// These never abort a merge; they are collected as diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// `export NAME` with no assignment.
    #[error("line {line}: export without assignment: {text}")]
    ExportWithoutValue {
        /// 1-based line number.
        line: usize,
        /// The offending line, trimmed.
        text: String,
    },

    /// The identifier does not match `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("line {line}: invalid variable name {name:?}")]
    InvalidName {
        /// 1-based line number.
        line: usize,
        /// The rejected identifier.
        name: String,
    },

    /// Reconciliation dropped a duplicate whose value differed from the kept one.
    #[error("{name}: dropped duplicate definition {dropped:?} (kept {kept:?})")]
    DivergentDuplicate {
        /// Variable name.
        name: String,
        /// Value that was kept.
        kept: String,
        /// Value that was dropped.
        dropped: String,
    },
}

/// Errors that arise from the backup manager.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The source file to snapshot does not exist.
    #[error("nothing to snapshot: {0} does not exist")]
    SourceMissing(PathBuf),

    /// Capture was refused because the content is not a valid configuration.
    #[error("refusing to snapshot invalid configuration {path}: {}", reasons.join("; "))]
    RefusedInvalid {
        /// Path that was rejected.
        path: PathBuf,
        /// Validator reasons.
        reasons: Vec<String>,
    },

    /// No backup with the given key is recorded.
    #[error("backup not found: {0}")]
    NotFound(String),

    /// Stored content does not match the digest recorded at capture.
    #[error("backup {key} failed integrity check (expected {expected}, got {actual})")]
    IntegrityMismatch {
        /// Backup key.
        key: String,
        /// Digest recorded at capture.
        expected: String,
        /// Digest of the stored bytes.
        actual: String,
    },

    /// The store or filesystem failed underneath the manager.
    #[error("backup storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl BackupError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RefusedInvalid { .. } | Self::IntegrityMismatch { .. } => {
                ErrorKind::ConfigCorruption
            }
            Self::SourceMissing(_) | Self::NotFound(_) | Self::Storage(_) => {
                ErrorKind::FatalPrecondition
            }
        }
    }
}

/// Errors that arise when every download source fails.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// No source list was provided.
    #[error("no download sources configured")]
    NoSources,

    /// Every source/transport combination failed.
    #[error("all {} download attempt(s) failed: {}", attempts.len(), attempts.join("; "))]
    Exhausted {
        /// One line per failed attempt.
        attempts: Vec<String>,
    },
}

/// Errors that arise from the recovery orchestrator.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Both the pinned and the latest reinstall failed.
    #[error("reinstall failed: pinned ({pinned}); latest ({latest})")]
    ReinstallExhausted {
        /// Why the pinned attempt failed (or was skipped).
        pinned: String,
        /// Why the latest attempt failed.
        latest: String,
    },

    /// No configuration candidate could be activated.
    #[error("no valid configuration could be activated")]
    NoViableConfig,

    /// The persisted store could not be read or written.
    #[error("persisted store error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
