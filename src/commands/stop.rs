//! Command: shutdown hook that persists configuration before a reboot.
use anyhow::Result;
use std::sync::Arc;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::logging::Logger;
use crate::recovery::{HostSystem, Orchestrator};
use crate::tasks::Context;

/// Run the stop command.
///
/// Persist problems are logged as warnings and never fail the hook.
///
/// # Errors
///
/// Returns an error only if settings cannot be loaded.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let ctx = setup.context(global, log);
    persist(&ctx);
    Ok(())
}

/// Snapshot and prune through the context's backup ring.
pub fn persist(ctx: &Context) {
    if ctx.dry_run {
        ctx.log.dry_run(&format!(
            "would snapshot {} and {}",
            ctx.settings.live_config_path().display(),
            ctx.settings.template_path().display()
        ));
        return;
    }

    let system = HostSystem::new((*ctx.settings).clone(), Arc::clone(&ctx.executor));
    let report = Orchestrator::new(&ctx.settings, &system, &ctx.backups, &ctx.validator).persist();

    for handle in &report.snapshots {
        ctx.log.info(&format!("saved {} as {}", handle.source.display(), handle.key));
    }
    if report.template_copied {
        ctx.log.debug(&format!(
            "template copied to {}",
            ctx.settings.persisted_template_path().display()
        ));
    }
    if report.pruned > 0 {
        ctx.log.info(&format!("{} old backup(s) pruned", report.pruned));
    }
    for warning in &report.warnings {
        ctx.log.warn(warning);
    }
}
