//! Command: merge the installed template with the live configuration.
use anyhow::Result;
use std::sync::Arc;

use super::{CommandSetup, run_tasks_to_completion};
use crate::cli::{GlobalOpts, MergeOpts};
use crate::config::merge::merge_files;
use crate::logging::Logger;
use crate::tasks::Task;
use crate::tasks::configuration::{MergeConfiguration, describe};
use crate::tasks::preconditions::CheckPreconditions;

/// Run the merge command.
///
/// With `--print` the merged text goes to stdout and nothing is written.
/// Otherwise the merge is activated like during an install.
///
/// # Errors
///
/// Returns an error if the template is unreadable or activation fails.
#[allow(clippy::print_stdout)]
pub fn run(global: &GlobalOpts, opts: &MergeOpts, log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;

    if opts.print {
        let template = opts
            .template
            .clone()
            .unwrap_or_else(|| setup.settings.template_path());
        let live = opts
            .live
            .clone()
            .unwrap_or_else(|| setup.settings.live_config_path());
        let result = merge_files(&template, &live)?;
        for diagnostic in &result.diagnostics {
            log.warn(&format!("merge: {diagnostic}"));
        }
        log.debug(&describe(&result));
        print!("{}", result.merged);
        return Ok(());
    }

    let ctx = setup.context(global, log);
    let tasks: [&dyn Task; 2] = [&CheckPreconditions, &MergeConfiguration];
    run_tasks_to_completion(&tasks, &ctx, log)
}
