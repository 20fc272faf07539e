//! Structured logger with dry-run awareness and summary collection.
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, TaskEntry, TaskStatus};
use super::utils::{log_dir, log_file_path};

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
///
/// The `record_task` method is **not** included because its signature differs
/// from the `fn(&self, &str)` pattern shared by the display methods.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// Messages go through [`tracing`]; the subscriber installed by
/// [`init_subscriber`](super::subscriber::init_subscriber) also appends them
/// to `<log_dir>/<command>.log` regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    tasks: Mutex<Vec<TaskEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a logger for `command` in the configured log directory.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::in_dir(&log_dir(), command)
    }

    /// Create a logger whose summary points at `<dir>/<command>.log`.
    #[must_use]
    pub fn in_dir(dir: &Path, command: &str) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            log_file: log_file_path(dir, command),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded task entries.
    #[must_use]
    pub fn task_entries(&self) -> Vec<TaskEntry> {
        self.tasks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record a task result for the summary.
    pub fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.tasks.lock() {
            guard.push(TaskEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Return `true` if any recorded task has failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Count the number of failed tasks.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        Tally::of(&self.task_entries()).count(TaskStatus::Failed)
    }

    /// Print the summary of all recorded tasks.
    #[allow(clippy::print_stdout)]
    pub fn print_summary(&self) {
        let tasks = self.task_entries();
        if tasks.is_empty() {
            return;
        }

        println!();
        self.stage("Summary");
        for task in &tasks {
            let suffix = task
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            self.info(&format!(
                "{}{} {}{suffix}\x1b[0m",
                task.status.color(),
                task.status.symbol(),
                task.name
            ));
        }

        println!();
        self.info(&Tally::of(&tasks).to_string());

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

/// Per-status task counts for the totals line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally([usize; TaskStatus::ALL.len()]);

impl Tally {
    /// Count `entries` by status.
    #[must_use]
    pub fn of(entries: &[TaskEntry]) -> Self {
        let mut counts = [0; TaskStatus::ALL.len()];
        for entry in entries {
            if let Some(slot) = TaskStatus::ALL
                .iter()
                .position(|s| *s == entry.status)
                .and_then(|i| counts.get_mut(i))
            {
                *slot += 1;
            }
        }
        Self(counts)
    }

    /// Tasks recorded with `status`.
    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        TaskStatus::ALL
            .iter()
            .position(|s| *s == status)
            .and_then(|i| self.0.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// All recorded tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tasks:", self.total())?;
        for (i, status) in TaskStatus::ALL.into_iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(
                f,
                "{sep}{}{} {}\x1b[0m",
                status.color(),
                self.count(status),
                status.label()
            )?;
        }
        Ok(())
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.record_task(name, status, message);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    fn log_contents(log: &Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path")).unwrap()
    }

    #[test]
    fn tally_counts_by_status() {
        let entry = |status| TaskEntry {
            name: "t".to_string(),
            status,
            message: None,
        };
        let tally = Tally::of(&[
            entry(TaskStatus::Ok),
            entry(TaskStatus::Ok),
            entry(TaskStatus::Skipped),
            entry(TaskStatus::Failed),
        ]);
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.count(TaskStatus::Ok), 2);
        assert_eq!(tally.count(TaskStatus::DryRun), 0);
        let line = crate::logging::utils::strip_ansi(&tally.to_string());
        assert_eq!(line, "4 tasks: 2 ok, 0 n/a, 1 skipped, 0 dry-run, 1 failed");
    }

    #[test]
    fn record_task_with_message() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record_task("backup live config", TaskStatus::Skipped, Some("no live config"));
        let tasks = log.task_entries();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "backup live config");
        assert_eq!(tasks[0].message, Some("no live config".to_string()));
    }

    #[test]
    fn failure_count_returns_correct_count() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(!log.has_failures());
        log.record_task("a", TaskStatus::Ok, None);
        log.record_task("b", TaskStatus::Failed, Some("error 1"));
        log.record_task("c", TaskStatus::Failed, Some("error 2"));
        log.record_task("d", TaskStatus::Skipped, None);
        assert_eq!(log.failure_count(), 2);
        assert!(log.has_failures());
    }

    #[test]
    fn log_trait_delegates_to_logger() {
        let (log, _tmp, _guard) = isolated_logger();
        let log_ref: &dyn Log = &log;
        log_ref.record_task("via-trait", TaskStatus::Ok, None);
        assert_eq!(log.task_entries().len(), 1);
    }

    #[test]
    fn file_has_run_header() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(log_contents(&log).contains("failover-installer"));
    }

    #[test]
    fn debug_always_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.debug("debug-marker");
        let contents = log_contents(&log);
        assert!(contents.contains("[debug] debug-marker"), "{contents}");
    }

    #[test]
    fn levels_are_tagged_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.warn("warn-marker");
        log.error("error-marker");
        log.stage("stage-marker");
        log.dry_run("dryrun-marker");
        let contents = log_contents(&log);
        assert!(contents.contains("[warn] warn-marker"));
        assert!(contents.contains("[error] error-marker"));
        assert!(contents.contains("==> stage-marker"));
        assert!(contents.contains("[dry run] dryrun-marker"));
    }

    #[test]
    fn ansi_codes_are_stripped_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.info("\x1b[32m✓ merged\x1b[0m");
        let contents = log_contents(&log);
        assert!(contents.contains("✓ merged"));
        assert!(!contents.contains('\x1b'));
    }
}
