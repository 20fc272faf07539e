//! Task: create the convenience symlinks.
use anyhow::Result;

use super::{Context, Task, TaskResult, process_resources, task_deps};
use crate::resources::symlink::SymlinkResource;

/// Link helper commands and the live config into well-known places.
#[derive(Debug)]
pub struct InstallLinks;

impl Task for InstallLinks {
    fn name(&self) -> &'static str {
        "Install convenience links"
    }

    task_deps![super::configuration::MergeConfiguration];

    fn should_run(&self, ctx: &Context) -> bool {
        !ctx.settings.links.is_empty()
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let settings = &ctx.settings;
        let resources = settings
            .links
            .iter()
            .map(|entry| SymlinkResource::new(settings.link_target(entry), entry.link.clone()));
        process_resources(ctx, resources, "link")
    }
}
