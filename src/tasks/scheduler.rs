//! Task: keep exactly one active crontab entry per managed job.
use anyhow::Result;

use super::{Context, Task, TaskResult, process_resources, task_deps};
use crate::backup::BackupKind;
use crate::config::Settings;
use crate::resources::Resource as _;
use crate::resources::cron::{CronEntry, CrontabResource};

/// Reconcile the crontab with the managed schedule.
#[derive(Debug)]
pub struct ConfigureScheduler;

/// The crontab resource for `settings`, with paths expanded.
#[must_use]
pub fn crontab(settings: &Settings) -> CrontabResource {
    let entries = settings
        .schedule
        .iter()
        .map(|entry| CronEntry {
            name: entry.name.clone(),
            schedule: entry.schedule.clone(),
            command: settings.expand(&entry.command),
        })
        .collect();
    CrontabResource::new(settings.paths.crontab.clone(), entries)
}

impl Task for ConfigureScheduler {
    fn name(&self) -> &'static str {
        "Configure scheduler"
    }

    task_deps![super::configuration::MergeConfiguration];

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.settings.schedule.is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let resource = crontab(&ctx.settings);

        if !ctx.dry_run && resource.path.exists() && resource.needs_change()? {
            let handle =
                ctx.backups
                    .snapshot(BackupKind::Schedule, &resource.path, "before crontab update")?;
            ctx.log.info(&format!(
                "backed up {} to {}",
                resource.path.display(),
                ctx.backups.location(&handle.key)
            ));
        }

        process_resources(ctx, [resource], "reconcile")
    }
}
