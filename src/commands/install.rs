//! Command: install or upgrade the agent.
use anyhow::Result;
use std::sync::Arc;

use super::{CommandSetup, run_tasks_to_completion};
use crate::cli::{GlobalOpts, InstallOpts};
use crate::logging::Logger;
use crate::tasks::{self, Task};

/// Run the install command.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or any task fails.
pub fn run(global: &GlobalOpts, opts: &InstallOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("failover-installer {}", super::version::current()));

    log.stage("Loading settings");
    let setup = CommandSetup::init(global, log)?;
    let ctx = setup
        .context(global, log)
        .with_release(opts.release.clone());

    let all_tasks = tasks::all_install_tasks();
    let selected = select(&all_tasks, opts);
    run_tasks_to_completion(&selected, &ctx, log)
}

/// Filter tasks by `--only` and `--skip` (case-insensitive substring match).
#[must_use]
pub fn select<'a>(all: &'a [Box<dyn Task>], opts: &InstallOpts) -> Vec<&'a dyn Task> {
    all.iter()
        .filter(|t| {
            let name = t.name().to_lowercase();
            if !opts.only.is_empty() {
                return opts.only.iter().any(|o| name.contains(&o.to_lowercase()));
            }
            if !opts.skip.is_empty() {
                return !opts.skip.iter().any(|s| name.contains(&s.to_lowercase()));
            }
            true
        })
        .map(AsRef::as_ref)
        .collect()
}
