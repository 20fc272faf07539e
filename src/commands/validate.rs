//! Command: validate a configuration file.
use anyhow::{Result, bail};
use std::sync::Arc;

use super::CommandSetup;
use crate::cli::{GlobalOpts, ValidateOpts};
use crate::config::validation::{ValidationMode, ValidationReport, Validator};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::Logger;

/// Run the validate command.
///
/// # Errors
///
/// Returns an error if the file fails validation.
pub fn run(global: &GlobalOpts, opts: &ValidateOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let path = opts
        .path
        .clone()
        .unwrap_or_else(|| setup.settings.live_config_path());
    let report = check(&setup, opts.fail_fast, Arc::new(SystemExecutor), &path);

    if report.ok {
        log.info(&format!("{} is valid", path.display()));
        return Ok(());
    }
    for reason in &report.reasons {
        log.error(reason);
    }
    bail!("{} failed validation", path.display())
}

/// Validate `path` with the settings' thresholds.
#[must_use]
pub fn check(
    setup: &CommandSetup,
    fail_fast: bool,
    executor: Arc<dyn Executor>,
    path: &std::path::Path,
) -> ValidationReport {
    let mode = if fail_fast {
        ValidationMode::FailFast
    } else {
        ValidationMode::Diagnostic
    };
    Validator::new(executor, setup.settings.validation.clone())
        .with_mode(mode)
        .validate(path)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn fail_fast_reports_one_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.sh");
        std::fs::write(&path, "X=1\n").unwrap();
        let setup = CommandSetup {
            settings: Settings::builtin(),
        };

        let all = check(&setup, false, Arc::new(SystemExecutor), &path);
        let first = check(&setup, true, Arc::new(SystemExecutor), &path);

        assert!(!all.ok);
        assert!(all.reasons.len() > 1, "{:?}", all.reasons);
        assert_eq!(first.reasons.len(), 1);
    }
}
