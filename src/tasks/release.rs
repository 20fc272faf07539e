//! Task: install the application tree when it is missing.
use anyhow::Result;
use std::sync::Arc;

use super::{Context, Task, TaskResult};
use crate::recovery::{HostSystem, ReinstallPlan, SystemAdapter as _};

/// Download and run the release installer.
///
/// With a requested release the pinned URLs are used; otherwise the newest
/// release is fetched.
#[derive(Debug)]
pub struct InstallRelease;

/// The reinstall plan for this run.
#[must_use]
pub fn plan(ctx: &Context) -> ReinstallPlan {
    let release = &ctx.settings.release;
    ctx.requested_release().map_or_else(
        || ReinstallPlan::Latest {
            urls: release.latest_urls.clone(),
        },
        |version| ReinstallPlan::Pinned {
            urls: release.pinned_for(&version),
            version,
        },
    )
}

fn host(ctx: &Context) -> HostSystem {
    HostSystem::new((*ctx.settings).clone(), Arc::clone(&ctx.executor))
}

impl Task for InstallRelease {
    fn name(&self) -> &'static str {
        "Install release"
    }

    fn critical(&self) -> bool {
        true
    }

    fn should_run(&self, ctx: &Context) -> bool {
        !host(ctx).app_tree_present()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let plan = plan(ctx);
        if ctx.dry_run {
            let from = plan.urls().first().map_or("<no source>", String::as_str);
            ctx.log
                .dry_run(&format!("would install release {} from {from}", plan.version()));
            return Ok(TaskResult::DryRun);
        }

        ctx.log.info(&format!(
            "installing release {} into {}",
            plan.version(),
            ctx.settings.paths.install_dir.display()
        ));
        let version = host(ctx).reinstall(&plan)?;
        ctx.log.info(&format!("installed {version}"));
        Ok(TaskResult::Ok)
    }
}
