//! Crontab resource: one active entry per managed task.
//!
//! Reconciliation never deletes a line. Entries whose timing differs from
//! the default are operator choices and stay as they are, however many there
//! are. Copies at the default timing are commented out with
//! [`DUPLICATE_MARKER`] when a custom entry exists, and otherwise reduced to
//! the first one. A missing entry is appended.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::helpers::fs::write_atomic;
use super::{Applicable, Resource, ResourceChange, ResourceState};

/// Prefix written in front of a disabled duplicate.
pub const DUPLICATE_MARKER: &str = "# disabled duplicate (failover-installer): ";

/// A managed periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    /// Label used in log output.
    pub name: String,
    /// Default timing (five cron fields or an `@` keyword).
    pub schedule: String,
    /// Command, compared with whitespace normalized.
    pub command: String,
}

impl CronEntry {
    fn line(&self) -> String {
        format!("{} {}", self.schedule.trim(), self.command.trim())
    }

    fn command_key(&self) -> String {
        normalize(&self.command)
    }
}

/// Result of reconciling a crontab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The new crontab text.
    pub text: String,
    /// One message per change made.
    pub changes: Vec<String>,
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split an active crontab line into `(timing, command)`.
///
/// Returns `None` for blanks, comments and environment assignments.
fn split_entry(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let mut fields = trimmed.split_whitespace();
    let first = fields.next()?;
    if first.starts_with('@') {
        return Some((first.to_string(), fields.collect::<Vec<_>>().join(" ")));
    }
    if first.contains('=') {
        return None;
    }
    let mut timing = vec![first];
    for _ in 0..4 {
        timing.push(fields.next()?);
    }
    let command = fields.collect::<Vec<_>>().join(" ");
    if command.is_empty() {
        return None;
    }
    Some((timing.join(" "), command))
}

/// Reconcile `current` against `entries`.
#[must_use]
pub fn reconcile_crontab(current: &str, entries: &[CronEntry]) -> Reconciliation {
    let mut lines: Vec<String> = current.lines().map(str::to_string).collect();
    let mut changes = Vec::new();

    for entry in entries {
        let key = entry.command_key();
        let default_timing = normalize(&entry.schedule);
        let matches: Vec<(usize, String)> = lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                let (timing, command) = split_entry(line)?;
                (command == key).then_some((idx, timing))
            })
            .collect();

        if matches.is_empty() {
            lines.push(entry.line());
            changes.push(format!("added {} entry", entry.name));
            continue;
        }

        let mut keep: Vec<usize> = matches
            .iter()
            .filter(|(_, timing)| *timing != default_timing)
            .map(|(idx, _)| *idx)
            .collect();
        if keep.is_empty() {
            keep.extend(matches.first().map(|(idx, _)| *idx));
        }

        for (idx, _) in &matches {
            if keep.contains(idx) {
                continue;
            }
            if let Some(line) = lines.get_mut(*idx) {
                *line = format!("{DUPLICATE_MARKER}{line}");
                changes.push(format!("disabled duplicate {} entry", entry.name));
            }
        }
    }

    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Reconciliation { text, changes }
}

/// The crontab file with its managed entries.
#[derive(Debug, Clone)]
pub struct CrontabResource {
    /// Crontab path.
    pub path: PathBuf,
    /// Managed entries.
    pub entries: Vec<CronEntry>,
}

impl CrontabResource {
    /// Create a new crontab resource.
    #[must_use]
    pub const fn new(path: PathBuf, entries: Vec<CronEntry>) -> Self {
        Self { path, entries }
    }

    fn read_current(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }
}

impl Applicable for CrontabResource {
    fn description(&self) -> String {
        format!("{} ({} managed entries)", self.path.display(), self.entries.len())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let current = self.read_current()?;
        let result = reconcile_crontab(&current, &self.entries);
        if result.changes.is_empty() {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        write_atomic(&self.path, result.text.as_bytes())?;
        for change in &result.changes {
            tracing::debug!("crontab: {change}");
        }
        Ok(ResourceChange::Applied)
    }
}

impl Resource for CrontabResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !self.path.exists() {
            return Ok(ResourceState::Missing);
        }
        let current = self.read_current()?;
        let result = reconcile_crontab(&current, &self.entries);
        if result.changes.is_empty() {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: result.changes.join(", "),
            })
        }
    }
}
