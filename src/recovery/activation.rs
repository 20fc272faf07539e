//! Committing a configuration candidate with ordered fallbacks.
//!
//! A candidate is staged next to the live file, validated there, and only
//! then renamed over it. When the candidate is rejected the fallbacks are
//! tried in order: keep the persisted file, restore the newest valid backup,
//! install the template defaults. Nothing invalid is ever activated.
//!
//! Every candidate, fallbacks included, is stamped with the bookkeeping of
//! the release that was just installed before it is validated.
use std::fmt;
use std::path::Path;

use crate::backup::BackupManager;
use crate::config::bookkeeping::{self, RecoveryBookkeeping};
use crate::config::validation::Validator;
use crate::error::RecoveryError;
use crate::resources::helpers::fs::{promote, tmp_path, write_atomic};

/// Which candidate ended up active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The freshly merged configuration.
    Merged,
    /// The persisted configuration with its bookkeeping renewed.
    DirectRestore,
    /// The newest config backup that still validates.
    BackupRestore,
    /// The template defaults (previous file quarantined first).
    TemplateDefaults,
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merged => "merged configuration",
            Self::DirectRestore => "persisted configuration",
            Self::BackupRestore => "backup restore",
            Self::TemplateDefaults => "template defaults",
        })
    }
}

/// Result of [`Activator::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activated {
    /// What is now live.
    pub activation: Activation,
    /// Operator-facing notes (rejections, backup and quarantine locations).
    pub notes: Vec<String>,
}

/// Stages, validates and commits configuration candidates.
#[derive(Debug, Clone, Copy)]
pub struct Activator<'a> {
    backups: &'a BackupManager,
    validator: &'a Validator,
}

impl<'a> Activator<'a> {
    /// Activator restoring from `backups` and gating with `validator`.
    #[must_use]
    pub const fn new(backups: &'a BackupManager, validator: &'a Validator) -> Self {
        Self { backups, validator }
    }

    /// Make `merged` live at `live`, falling back to `defaults` last.
    ///
    /// `fresh` replaces whatever bookkeeping block each candidate carries.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NoViableConfig`] when every candidate is
    /// rejected and [`RecoveryError::Storage`] when staging fails.
    pub fn activate(
        &self,
        live: &Path,
        merged: &str,
        defaults: &str,
        fresh: &RecoveryBookkeeping,
    ) -> Result<Activated, RecoveryError> {
        let stamp = |text: &str| bookkeeping::apply(text, fresh);
        let mut notes = Vec::new();

        if let Some(reasons) = self.try_commit(live, &stamp(merged))? {
            notes.push(format!("merged configuration rejected: {}", reasons.join("; ")));
        } else {
            return Ok(Activated {
                activation: Activation::Merged,
                notes,
            });
        }

        match std::fs::read_to_string(live) {
            Ok(persisted) => match self.try_commit(live, &stamp(&persisted))? {
                None => {
                    tracing::warn!("keeping persisted configuration {}", live.display());
                    return Ok(Activated {
                        activation: Activation::DirectRestore,
                        notes,
                    });
                }
                Some(reasons) => notes.push(format!(
                    "persisted configuration rejected: {}",
                    reasons.join("; ")
                )),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => notes.push(format!("persisted configuration unreadable: {e}")),
        }

        let restamp = |bytes: Vec<u8>| stamp(&String::from_utf8_lossy(&bytes)).into_bytes();
        match self.backups.restore_latest_valid(live, restamp) {
            Ok(Some(handle)) => {
                notes.push(format!(
                    "restored backup {}",
                    self.backups.location(&handle.key)
                ));
                return Ok(Activated {
                    activation: Activation::BackupRestore,
                    notes,
                });
            }
            Ok(None) => notes.push("no valid configuration backup".to_string()),
            Err(e) => notes.push(format!("backups unavailable: {e}")),
        }

        if live.exists() {
            match self.backups.quarantine(live) {
                Ok(location) => notes.push(format!("previous configuration quarantined at {location}")),
                Err(e) => {
                    tracing::error!("cannot quarantine {}: {e}", live.display());
                    notes.push(format!("quarantine failed, {} left in place: {e}", live.display()));
                    return Err(RecoveryError::NoViableConfig);
                }
            }
        }

        if let Some(reasons) = self.try_commit(live, &stamp(defaults))? {
            tracing::error!("template defaults rejected: {}", reasons.join("; "));
            return Err(RecoveryError::NoViableConfig);
        }
        Ok(Activated {
            activation: Activation::TemplateDefaults,
            notes,
        })
    }

    /// Stage, validate and promote `text`; returns the rejection reasons.
    fn try_commit(&self, live: &Path, text: &str) -> Result<Option<Vec<String>>, RecoveryError> {
        let staged = tmp_path(live);
        write_atomic(&staged, text.as_bytes())?;
        let report = self.validator.validate(&staged);
        if !report.ok {
            let _ = std::fs::remove_file(&staged);
            return Ok(Some(report.reasons));
        }
        promote(&staged, live)?;
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::backup::BackupKind;
    use crate::config::settings::ValidationSettings;
    use crate::exec::SystemExecutor;
    use crate::store::FsStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    const VALID: &str = "\
# failover configuration
export STARLINK_IP=\"192.168.100.1\"
export MWAN_IFACE=\"wan\"
export MWAN_MEMBER=\"member1\"
";
    const BROKEN: &str = "\
export STARLINK_IP=\"192.168.100.1\"
export MWAN_IFACE=\"wan\"
export MWAN_MEMBER=\"member1\"
if then fi
";

    struct Fixture {
        _dir: tempfile::TempDir,
        live: std::path::PathBuf,
        backups: BackupManager,
        validator: Validator,
        fresh: RecoveryBookkeeping,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(Arc::new(SystemExecutor), ValidationSettings::default());
        let backups = BackupManager::new(Arc::new(FsStore::new(dir.path())), validator.clone());
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        Fixture {
            live: dir.path().join("config.sh"),
            _dir: dir,
            backups,
            validator,
            fresh: RecoveryBookkeeping::new("v3.0.0", "https://dl.lan/v3.0.0/install.sh", at),
        }
    }

    fn stale(text: &str) -> String {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        bookkeeping::apply(
            text,
            &RecoveryBookkeeping::new("v1.0.0", "https://old/install.sh", at),
        )
    }

    fn live_text(f: &Fixture) -> String {
        std::fs::read_to_string(&f.live).unwrap()
    }

    #[test]
    fn valid_merge_is_committed() {
        let f = fixture();
        let activator = Activator::new(&f.backups, &f.validator);
        let out = activator.activate(&f.live, VALID, VALID, &f.fresh).unwrap();
        assert_eq!(out.activation, Activation::Merged);
        assert_eq!(live_text(&f), bookkeeping::apply(VALID, &f.fresh));
        assert!(!tmp_path(&f.live).exists());
    }

    #[test]
    fn rejected_merge_keeps_persisted_values_with_fresh_bookkeeping() {
        let f = fixture();
        let persisted = stale(&format!("{VALID}export EXTRA=\"kept\"\n"));
        std::fs::write(&f.live, &persisted).unwrap();
        let activator = Activator::new(&f.backups, &f.validator);

        let out = activator.activate(&f.live, BROKEN, VALID, &f.fresh).unwrap();

        assert_eq!(out.activation, Activation::DirectRestore);
        let live = live_text(&f);
        assert!(live.contains("export EXTRA=\"kept\""));
        assert_eq!(RecoveryBookkeeping::read(&live), Some(f.fresh.clone()));
        assert!(!live.contains("v1.0.0"));
        assert!(out.notes[0].starts_with("merged configuration rejected"));
    }

    #[test]
    fn backup_restore_renews_bookkeeping() {
        let f = fixture();
        std::fs::write(&f.live, stale(VALID)).unwrap();
        f.backups.snapshot(BackupKind::Config, &f.live, "").unwrap();
        std::fs::write(&f.live, BROKEN).unwrap();

        let activator = Activator::new(&f.backups, &f.validator);
        let out = activator.activate(&f.live, BROKEN, VALID, &f.fresh).unwrap();

        assert_eq!(out.activation, Activation::BackupRestore);
        let live = live_text(&f);
        assert_eq!(live, bookkeeping::apply(VALID, &f.fresh));
        assert!(!live.contains("https://old/install.sh"));
    }

    #[test]
    fn template_defaults_after_quarantine() {
        let f = fixture();
        std::fs::write(&f.live, BROKEN).unwrap();
        let activator = Activator::new(&f.backups, &f.validator);
        let out = activator.activate(&f.live, BROKEN, VALID, &f.fresh).unwrap();
        assert_eq!(out.activation, Activation::TemplateDefaults);
        assert_eq!(live_text(&f), bookkeeping::apply(VALID, &f.fresh));
        assert!(out.notes.iter().any(|n| n.contains("quarantined")));
    }

    #[test]
    fn nothing_valid_leaves_live_file_alone() {
        let f = fixture();
        std::fs::write(&f.live, BROKEN).unwrap();
        let activator = Activator::new(&f.backups, &f.validator);
        let err = activator
            .activate(&f.live, BROKEN, "short\n", &f.fresh)
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NoViableConfig));
        assert_eq!(live_text(&f), BROKEN);
    }
}
