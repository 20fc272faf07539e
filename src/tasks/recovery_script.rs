//! Task: regenerate the version-pinned recovery script.
use anyhow::Result;

use super::{Context, Task, TaskResult, process_resources, task_deps};
use crate::recovery::recovery_script;

/// Write `recovery/recover.sh` for the installed version.
#[derive(Debug)]
pub struct WriteRecoveryScript;

impl Task for WriteRecoveryScript {
    fn name(&self) -> &'static str {
        "Write recovery script"
    }

    task_deps![super::configuration::MergeConfiguration];

    fn should_run(&self, _ctx: &Context) -> bool {
        true
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let Some(version) = ctx.installed_version() else {
            return Ok(TaskResult::Skipped("installed version unknown".to_string()));
        };
        ctx.log.debug(&format!("pinning recovery to {version}"));
        process_resources(ctx, [recovery_script(&ctx.settings, &version)], "write")
    }
}
