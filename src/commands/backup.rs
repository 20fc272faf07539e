//! Command: snapshot, list, restore and prune backups.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::CommandSetup;
use crate::backup::{BackupHandle, BackupKind, BackupManager, age_cutoff};
use crate::cli::{BackupAction, BackupOpts, GlobalOpts};
use crate::config::Settings;
use crate::error::BackupError;
use crate::logging::Logger;
use crate::tasks::Context;

/// File managed for each backup kind.
#[must_use]
pub fn managed_path(settings: &Settings, kind: BackupKind) -> PathBuf {
    match kind {
        BackupKind::Config => settings.live_config_path(),
        BackupKind::Template => settings.template_path(),
        BackupKind::Schedule => settings.paths.crontab.clone(),
    }
}

/// One line of `backup list` output.
#[must_use]
pub fn format_handle(handle: &BackupHandle) -> String {
    let digest = handle.sha256.get(..12).unwrap_or(&handle.sha256);
    let mut line = format!(
        "{:<55} {:<8} {} {:>7}B {digest} {}",
        handle.key,
        handle.kind,
        handle.created.format("%Y-%m-%d %H:%M:%S"),
        handle.size,
        handle.source.display()
    );
    if !handle.description.is_empty() {
        line.push_str(&format!("  ({})", handle.description));
    }
    line
}

/// Run the backup command.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written, the backup is
/// unknown, or restored content fails its integrity or validation check.
pub fn run(global: &GlobalOpts, opts: &BackupOpts, log: &std::sync::Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let ctx = setup.context(global, log);
    dispatch(&ctx, &opts.action)
}

/// Carry out `action` against the context's backup ring.
///
/// # Errors
///
/// See [`run`].
#[allow(clippy::print_stdout)]
pub fn dispatch(ctx: &Context, action: &BackupAction) -> Result<()> {
    let backups: &BackupManager = &ctx.backups;
    match action {
        BackupAction::Snapshot {
            kind,
            path,
            description,
        } => {
            let path = path
                .clone()
                .unwrap_or_else(|| managed_path(&ctx.settings, *kind));
            if ctx.dry_run {
                ctx.log
                    .dry_run(&format!("would snapshot {} as {kind}", path.display()));
                return Ok(());
            }
            let handle = backups.snapshot(*kind, &path, description)?;
            ctx.log.info(&format!(
                "{} saved to {}",
                handle.key,
                backups.location(&handle.key)
            ));
        }
        BackupAction::List { kind } => {
            let handles = backups.list(*kind)?;
            if handles.is_empty() {
                ctx.log.info("no backups recorded");
            }
            for handle in &handles {
                println!("{}", format_handle(handle));
            }
        }
        BackupAction::Restore { key, to } => {
            let handle = backups.find(key)?;
            let dest = to.clone().unwrap_or_else(|| handle.source.clone());
            if ctx.dry_run {
                ctx.log
                    .dry_run(&format!("would restore {key} to {}", dest.display()));
                return Ok(());
            }
            if dest.exists() {
                let note = format!("before restore of {key}");
                match backups.snapshot(handle.kind, &dest, &note) {
                    Ok(current) => ctx.log.info(&format!(
                        "current {} saved as {}",
                        dest.display(),
                        current.key
                    )),
                    Err(BackupError::RefusedInvalid { .. }) => {
                        let location = backups
                            .quarantine(&dest)
                            .context("preserving the file being replaced")?;
                        ctx.log.warn(&format!(
                            "current {} is invalid; raw copy kept at {location}",
                            dest.display()
                        ));
                    }
                    Err(e) => return Err(e).context("backing up the file being replaced"),
                }
            }
            backups.restore_to(&handle, &dest)?;
            ctx.log
                .info(&format!("restored {key} to {}", dest.display()));
        }
        BackupAction::Prune {
            retain,
            max_age_days,
        } => {
            let retain = retain.unwrap_or(ctx.settings.backup.retain);
            let max_age = max_age_days.unwrap_or(ctx.settings.backup.max_age_days);
            if ctx.dry_run {
                ctx.log.dry_run(&format!(
                    "would keep {retain} per kind and drop backups older than {max_age} days"
                ));
                return Ok(());
            }
            let mut removed = Vec::new();
            for kind in BackupKind::ALL {
                removed.extend(backups.prune(kind, retain)?);
            }
            if let Some(cutoff) = age_cutoff(max_age) {
                removed.extend(backups.prune_older_than(cutoff)?);
            }
            for handle in &removed {
                ctx.log.debug(&format!("pruned {}", handle.key));
            }
            ctx.log.info(&format!("{} backup(s) pruned", removed.len()));
        }
    }
    Ok(())
}
