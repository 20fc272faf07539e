//! Named, dependency-ordered tasks that make up an installer run.
pub mod backups;
pub mod configuration;
mod context;
pub mod graph;
pub mod links;
pub mod preconditions;
mod processing;
pub mod recovery_script;
pub mod release;
pub mod scheduler;

/// Implement [`Task::dependencies`] by expanding to the required
/// `fn dependencies(&self) -> &[TypeId]` method body.
///
/// The `const DEPS` intermediate gives the slice the `'static` lifetime the
/// return type needs.
///
/// # Examples
///
/// ```ignore
/// task_deps![super::release::InstallRelease]
/// // expands to:
/// //   fn dependencies(&self) -> &[std::any::TypeId] {
/// //       const DEPS: &[std::any::TypeId] = &[
/// //           std::any::TypeId::of::<super::release::InstallRelease>(),
/// //       ];
/// //       DEPS
/// //   }
/// ```
macro_rules! task_deps {
    [$($dep:ty),+ $(,)?] => {
        fn dependencies(&self) -> &[std::any::TypeId] {
            const DEPS: &[std::any::TypeId] = &[$(std::any::TypeId::of::<$dep>()),+];
            DEPS
        }
    };
}

pub(crate) use task_deps;

pub use context::Context;
pub use processing::{TaskResult, TaskStats, process_resources};

use std::any::TypeId;

use anyhow::Result;

use crate::logging::TaskStatus;

/// A named, executable task.
///
/// The `'static` bound gives each task struct a stable [`TypeId`], which
/// [`graph::execution_order`] uses to match dependency declarations.
pub trait Task: Send + Sync + 'static {
    /// Human-readable task name.
    fn name(&self) -> &str;

    /// The concrete `TypeId` of this task, used as a dependency identifier.
    fn task_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Tasks that must complete before this task starts.
    fn dependencies(&self) -> &[TypeId] {
        &[]
    }

    /// Whether a failure of this task must stop the run.
    ///
    /// Tasks that guard or perform the configuration commit are critical;
    /// nothing after them runs once they fail.
    fn critical(&self) -> bool {
        false
    }

    /// Whether this task applies to the current system state.
    fn should_run(&self, ctx: &Context) -> bool;

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task fails, such as when a precondition does
    /// not hold, a download is exhausted, or no configuration validates.
    fn run(&self, ctx: &Context) -> Result<TaskResult>;
}

/// The complete set of tasks run by the install command.
///
/// Order within the list is arbitrary; [`graph::execution_order`] derives
/// execution order from each task's [`Task::dependencies`].
#[must_use]
pub fn all_install_tasks() -> Vec<Box<dyn Task>> {
    vec![
        Box::new(release::InstallRelease),
        Box::new(preconditions::CheckPreconditions),
        Box::new(configuration::MergeConfiguration),
        Box::new(recovery_script::WriteRecoveryScript),
        Box::new(scheduler::ConfigureScheduler),
        Box::new(links::InstallLinks),
        Box::new(backups::PruneBackups),
    ]
}

/// Execute a task, recording the result in the logger.
///
/// Returns the recorded status.
pub fn execute(task: &dyn Task, ctx: &Context) -> TaskStatus {
    if !task.should_run(ctx) {
        ctx.log
            .debug(&format!("skipping task: {} (not applicable)", task.name()));
        ctx.log
            .record_task(task.name(), TaskStatus::NotApplicable, None);
        return TaskStatus::NotApplicable;
    }

    ctx.log.stage(task.name());

    match task.run(ctx) {
        Ok(TaskResult::Ok) => {
            ctx.log.record_task(task.name(), TaskStatus::Ok, None);
            TaskStatus::Ok
        }
        Ok(TaskResult::Skipped(reason)) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_task(task.name(), TaskStatus::Skipped, Some(&reason));
            TaskStatus::Skipped
        }
        Ok(TaskResult::DryRun) => {
            ctx.log.record_task(task.name(), TaskStatus::DryRun, None);
            TaskStatus::DryRun
        }
        Err(e) => {
            ctx.log.error(&format!("{}: {e:#}", task.name()));
            ctx.log
                .record_task(task.name(), TaskStatus::Failed, Some(&format!("{e:#}")));
            TaskStatus::Failed
        }
    }
}
