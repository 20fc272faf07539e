//! Command: boot-time recovery entry point, called from the init script.
use anyhow::{Result, bail};
use std::sync::Arc;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::logging::Logger;
use crate::recovery::{HostSystem, Orchestrator, RecoveryOutcome, RecoveryState, SystemAdapter};
use crate::tasks::Context;

/// Run the start command.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or automated recovery
/// gave up.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let ctx = setup.context(global, log);
    let system = HostSystem::new((*ctx.settings).clone(), Arc::clone(&ctx.executor));
    boot(&ctx, &system)
}

/// Drive recovery against `system` and report the outcome.
///
/// # Errors
///
/// Returns an error when the run ends in [`RecoveryState::Failed`].
pub fn boot(ctx: &Context, system: &dyn SystemAdapter) -> Result<()> {
    if ctx.dry_run {
        if system.app_tree_present() {
            ctx.log.dry_run("application tree present; no recovery needed");
        } else {
            ctx.log.dry_run(&format!(
                "application tree missing; would recover from {}",
                ctx.settings.live_config_path().display()
            ));
        }
        return Ok(());
    }

    let outcome =
        Orchestrator::new(&ctx.settings, system, &ctx.backups, &ctx.validator).run_boot();
    report(ctx, &outcome)
}

fn report(ctx: &Context, outcome: &RecoveryOutcome) -> Result<()> {
    let path: Vec<String> = outcome.transitions.iter().map(ToString::to_string).collect();
    ctx.log.debug(&format!("recovery path: {}", path.join(" -> ")));

    match outcome.state() {
        RecoveryState::Failed => {
            ctx.log.error("automated recovery failed; to recover by hand:");
            for step in &outcome.manual_steps {
                ctx.log.error(&format!("  {step}"));
            }
            bail!("recovery failed")
        }
        RecoveryState::NotNeeded => {
            ctx.log.info("recovery not needed");
            Ok(())
        }
        state => {
            if let Some(version) = &outcome.installed_version {
                ctx.log.info(&format!("reinstalled {version}"));
            }
            ctx.log.info(&format!("recovery finished: {state}"));
            Ok(())
        }
    }
}
