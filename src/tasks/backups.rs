//! Task: keep the backup ring bounded.
use anyhow::Result;

use super::{Context, Task, TaskResult, task_deps};
use crate::backup::{BackupKind, age_cutoff};

/// Prune snapshots beyond the retention count and the maximum age.
#[derive(Debug)]
pub struct PruneBackups;

impl Task for PruneBackups {
    fn name(&self) -> &'static str {
        "Prune backups"
    }

    task_deps![
        super::configuration::MergeConfiguration,
        super::scheduler::ConfigureScheduler,
    ];

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.settings.backups_dir().exists()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let retain = ctx.settings.backup.retain;

        if ctx.dry_run {
            for kind in BackupKind::ALL {
                let excess = ctx.backups.list(Some(kind))?.len().saturating_sub(retain);
                if excess > 0 {
                    ctx.log
                        .dry_run(&format!("would prune {excess} {kind} backup(s)"));
                }
            }
            return Ok(TaskResult::DryRun);
        }

        let mut pruned = 0usize;
        for kind in BackupKind::ALL {
            pruned += ctx.backups.prune(kind, retain)?.len();
        }
        if let Some(cutoff) = age_cutoff(ctx.settings.backup.max_age_days) {
            pruned += ctx.backups.prune_older_than(cutoff)?.len();
        }
        ctx.log.info(&format!("{pruned} backup(s) pruned"));
        Ok(TaskResult::Ok)
    }
}
