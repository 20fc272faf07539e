//! Task: verify what the configuration commit needs before anything is touched.
use anyhow::Result;
use std::path::Path;

use super::{Context, Task, TaskResult, task_deps};
use crate::error::ConfigError;

/// Abort the run unless the template is readable and the persisted store is
/// writable.
#[derive(Debug)]
pub struct CheckPreconditions;

const PROBE_NAME: &str = ".write-probe";

/// Check that `dir` exists (creating it) and accepts a file.
///
/// # Errors
///
/// Returns [`ConfigError::StoreNotWritable`] otherwise.
pub fn check_writable(dir: &Path) -> Result<(), ConfigError> {
    let not_writable = |e: std::io::Error| ConfigError::StoreNotWritable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };
    std::fs::create_dir_all(dir).map_err(not_writable)?;
    let probe = dir.join(PROBE_NAME);
    std::fs::write(&probe, b"probe").map_err(not_writable)?;
    std::fs::remove_file(&probe).map_err(not_writable)
}

/// Check that the template at `path` can be opened.
///
/// # Errors
///
/// Returns [`ConfigError::TemplateUnreadable`] otherwise.
pub fn check_template(path: &Path) -> Result<(), ConfigError> {
    std::fs::File::open(path)
        .map(drop)
        .map_err(|source| ConfigError::TemplateUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

impl Task for CheckPreconditions {
    fn name(&self) -> &'static str {
        "Check preconditions"
    }

    task_deps![super::release::InstallRelease];

    fn critical(&self) -> bool {
        true
    }

    fn should_run(&self, _ctx: &Context) -> bool {
        true
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        let template = ctx.settings.template_path();
        let persist_dir = &ctx.settings.paths.persist_dir;

        if ctx.dry_run {
            if !template.exists() {
                return Ok(TaskResult::Skipped(
                    "template not installed yet (dry run)".to_string(),
                ));
            }
            check_template(&template)?;
            ctx.log
                .dry_run(&format!("would verify {} is writable", persist_dir.display()));
            return Ok(TaskResult::DryRun);
        }

        check_template(&template)?;
        ctx.log.debug(&format!("template readable: {}", template.display()));
        check_writable(persist_dir)?;
        ctx.log
            .debug(&format!("persisted store writable: {}", persist_dir.display()));
        Ok(TaskResult::Ok)
    }
}
