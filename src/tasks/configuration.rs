//! Task: merge the installed template with the live configuration and commit.
use anyhow::{Context as _, Result};

use super::{Context, Task, TaskResult, task_deps};
use crate::backup::BackupKind;
use crate::config::merge::{MergeResult, merge_files};
use crate::error::BackupError;
use crate::recovery::{Activation, Activator, fresh_bookkeeping};

/// Merge, validate and activate the configuration.
///
/// The live file is backed up first (or quarantined when it no longer
/// validates); the merged text is staged and only promoted once it passes
/// the validator.
#[derive(Debug)]
pub struct MergeConfiguration;

/// One-line description of what a merge did.
#[must_use]
pub fn describe(result: &MergeResult) -> String {
    format!(
        "{} preserved, {} new defaults, {} placeholders kept, {} custom settings carried over",
        result.preserved_count,
        result.new_default_count,
        result.kept_default_count,
        result.extra_count
    )
}

impl MergeConfiguration {
    /// Back up the live config before it is replaced.
    fn protect_live(ctx: &Context) -> Result<()> {
        let live = ctx.settings.live_config_path();
        match ctx.backups.snapshot(BackupKind::Config, &live, "before install") {
            Ok(handle) => {
                ctx.log.info(&format!(
                    "backed up live configuration to {}",
                    ctx.backups.location(&handle.key)
                ));
                Ok(())
            }
            Err(BackupError::SourceMissing(_)) => {
                ctx.log.debug("no live configuration yet; first install");
                Ok(())
            }
            Err(BackupError::RefusedInvalid { reasons, .. }) => {
                ctx.log.warn(&format!(
                    "live configuration fails validation: {}",
                    reasons.join("; ")
                ));
                let location = ctx
                    .backups
                    .quarantine(&live)
                    .context("preserving the invalid live configuration")?;
                ctx.log.warn(&format!("raw copy kept at {location}"));
                Ok(())
            }
            Err(e) => Err(e).context("backing up the live configuration"),
        }
    }
}

impl Task for MergeConfiguration {
    fn name(&self) -> &'static str {
        "Merge configuration"
    }

    task_deps![super::preconditions::CheckPreconditions];

    fn critical(&self) -> bool {
        true
    }

    fn should_run(&self, _ctx: &Context) -> bool {
        true
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let settings = &ctx.settings;
        let template = settings.template_path();
        let live = settings.live_config_path();

        if ctx.dry_run && !template.exists() {
            return Ok(TaskResult::Skipped(
                "template not installed yet (dry run)".to_string(),
            ));
        }

        let result = merge_files(&template, &live)?;
        for diagnostic in &result.diagnostics {
            ctx.log.warn(&format!("merge: {diagnostic}"));
        }
        let summary = describe(&result);

        if ctx.dry_run {
            ctx.log
                .dry_run(&format!("would write {}: {summary}", live.display()));
            return Ok(TaskResult::DryRun);
        }

        Self::protect_live(ctx)?;

        let version = ctx
            .installed_version()
            .unwrap_or_else(|| "unknown".to_string());
        let fresh = fresh_bookkeeping(settings, &version);
        let defaults = std::fs::read_to_string(&template)
            .with_context(|| format!("reading {}", template.display()))?;

        let activated = Activator::new(&ctx.backups, &ctx.validator).activate(
            &live,
            &result.merged,
            &defaults,
            &fresh,
        )?;
        for note in &activated.notes {
            ctx.log.warn(note);
        }
        if activated.activation == Activation::Merged {
            ctx.log.info(&summary);
        } else {
            ctx.log
                .warn(&format!("activated {} instead of the merge", activated.activation));
        }
        ctx.log.info(&format!("{} ({version})", live.display()));
        Ok(TaskResult::Ok)
    }
}
