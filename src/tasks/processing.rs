//! Generic resource processing loop: check state, apply, collect stats.
use anyhow::Result;

use super::Context;
use crate::resources::{Resource, ResourceChange, ResourceState};

/// Result of a single task execution.
///
/// # Examples
///
/// ```
/// use failover_installer::tasks::TaskResult;
///
/// let ok = TaskResult::Ok;
/// let skipped = TaskResult::Skipped("no live config yet".into());
/// let dry = TaskResult::DryRun;
///
/// assert!(matches!(ok, TaskResult::Ok));
/// assert!(matches!(skipped, TaskResult::Skipped(_)));
/// assert!(matches!(dry, TaskResult::DryRun));
/// ```
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// Task completed successfully.
    Ok,
    /// Task had nothing to do.
    Skipped(String),
    /// Task ran in dry-run mode.
    DryRun,
}

/// Counters for batch tasks that process many items.
///
/// # Examples
///
/// ```
/// use failover_installer::tasks::TaskStats;
///
/// let stats = TaskStats { changed: 1, already_ok: 2, skipped: 3 };
/// assert_eq!(stats.summary(false), "1 changed, 2 already ok, 3 skipped");
/// assert_eq!(TaskStats { changed: 2, ..TaskStats::new() }.summary(true), "2 would change, 0 already ok");
/// ```
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Number of items changed or applied.
    pub changed: u32,
    /// Number of items already in the correct state.
    pub already_ok: u32,
    /// Number of items skipped.
    pub skipped: u32,
}

impl TaskStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        if self.skipped > 0 {
            format!(
                "{} {verb}, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} {verb}, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Log the summary and return the appropriate `TaskResult`.
    #[must_use]
    pub fn finish(self, ctx: &Context) -> TaskResult {
        ctx.log.info(&self.summary(ctx.dry_run));
        if ctx.dry_run {
            TaskResult::DryRun
        } else {
            TaskResult::Ok
        }
    }
}

/// Check each resource and apply the ones that are missing or incorrect.
///
/// Invalid resources are skipped with a debug message. In dry-run mode the
/// change is only reported.
///
/// # Errors
///
/// Returns the first state-check or apply error.
pub fn process_resources<R: Resource>(
    ctx: &Context,
    resources: impl IntoIterator<Item = R>,
    verb: &str,
) -> Result<TaskResult> {
    let mut stats = TaskStats::new();
    for resource in resources {
        let desc = resource.description();
        match resource.current_state()? {
            ResourceState::Correct => {
                ctx.log.debug(&format!("ok: {desc}"));
                stats.already_ok += 1;
            }
            ResourceState::Invalid { reason } => {
                ctx.log.debug(&format!("skipping {desc}: {reason}"));
                stats.skipped += 1;
            }
            state @ (ResourceState::Missing | ResourceState::Incorrect { .. }) => {
                if ctx.dry_run {
                    let msg = if let ResourceState::Incorrect { current } = state {
                        format!("would {verb} {desc} (currently {current})")
                    } else {
                        format!("would {verb}: {desc}")
                    };
                    ctx.log.dry_run(&msg);
                    stats.changed += 1;
                    continue;
                }
                match resource.apply()? {
                    ResourceChange::Applied => {
                        ctx.log.debug(&format!("{verb}: {desc}"));
                        stats.changed += 1;
                    }
                    ResourceChange::AlreadyCorrect => stats.already_ok += 1,
                    ResourceChange::Skipped { reason } => {
                        ctx.log.warn(&format!("failed to {verb} {desc}: {reason}"));
                        stats.skipped += 1;
                    }
                }
            }
        }
    }
    Ok(stats.finish(ctx))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::Applicable;
    use crate::tasks::test_helpers::TestEnv;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct MockResource {
        state: ResourceState,
        applied: Rc<Cell<bool>>,
    }

    fn mock(state: ResourceState) -> (MockResource, Rc<Cell<bool>>) {
        let applied = Rc::new(Cell::new(false));
        (
            MockResource {
                state,
                applied: Rc::clone(&applied),
            },
            applied,
        )
    }

    impl Applicable for MockResource {
        fn description(&self) -> String {
            "mock".to_string()
        }

        fn apply(&self) -> Result<ResourceChange> {
            self.applied.set(true);
            Ok(ResourceChange::Applied)
        }
    }

    impl Resource for MockResource {
        fn current_state(&self) -> Result<ResourceState> {
            Ok(self.state.clone())
        }
    }

    #[test]
    fn applies_missing_and_counts_correct() {
        let env = TestEnv::new();
        let ctx = env.context();
        let (missing, missing_applied) = mock(ResourceState::Missing);
        let (correct, correct_applied) = mock(ResourceState::Correct);
        let result = process_resources(&ctx, [missing, correct], "link").unwrap();
        assert!(matches!(result, TaskResult::Ok));
        assert!(missing_applied.get());
        assert!(!correct_applied.get());
    }

    #[test]
    fn dry_run_does_not_apply() {
        let env = TestEnv::new();
        let ctx = env.context().with_dry_run(true);
        let (incorrect, applied) = mock(ResourceState::Incorrect {
            current: "elsewhere".to_string(),
        });
        let result = process_resources(&ctx, [incorrect], "link").unwrap();
        assert!(matches!(result, TaskResult::DryRun));
        assert!(!applied.get());
    }

    #[test]
    fn stats_summary_formats() {
        let stats = TaskStats {
            changed: 3,
            already_ok: 10,
            skipped: 0,
        };
        assert_eq!(stats.summary(false), "3 changed, 10 already ok");
    }
}
