//! Task dependency graph: ordering and cycle detection.

use std::any::TypeId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::Task;

/// Order `tasks` so every task comes after its dependencies (Kahn's
/// algorithm).
///
/// Ties keep list order, so the result is deterministic. Dependencies on
/// tasks that are not in the list are ignored. Returns `None` if the graph
/// contains a cycle.
#[must_use]
pub fn execution_order(tasks: &[&dyn Task]) -> Option<Vec<usize>> {
    let type_to_idx: HashMap<TypeId, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.task_id(), i))
        .collect();

    let mut in_degree: Vec<usize> = tasks
        .iter()
        .map(|t| {
            t.dependencies()
                .iter()
                .filter(|d| type_to_idx.contains_key(d))
                .count()
        })
        .collect();

    let mut reverse_deps: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, t) in tasks.iter().enumerate() {
        for dep in t.dependencies() {
            if let Some(&dep_idx) = type_to_idx.get(dep)
                && let Some(rd) = reverse_deps.get_mut(dep_idx)
            {
                rd.push(i);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        if let Some(dependents) = reverse_deps.get(idx) {
            for &dep in dependents {
                if let Some(count) = in_degree.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dep));
                    }
                }
            }
        }
    }

    (order.len() == tasks.len()).then_some(order)
}

/// Whether the task dependency graph contains at least one cycle.
#[must_use]
pub fn has_cycle(tasks: &[&dyn Task]) -> bool {
    execution_order(tasks).is_none()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tasks::{Context, TaskResult};

    use anyhow::Result;

    // -----------------------------------------------------------------------
    // Mock tasks; each is a distinct type so TypeId-based deps work.
    // -----------------------------------------------------------------------

    macro_rules! mock_task {
        ($name:ident, $display:expr, $deps:expr) => {
            struct $name;
            impl Task for $name {
                fn name(&self) -> &str {
                    $display
                }
                fn dependencies(&self) -> &[TypeId] {
                    const DEPS: &[TypeId] = $deps;
                    DEPS
                }
                fn should_run(&self, _ctx: &Context) -> bool {
                    true
                }
                fn run(&self, _ctx: &Context) -> Result<TaskResult> {
                    Ok(TaskResult::Ok)
                }
            }
        };
    }

    mock_task!(TaskA, "a", &[]);
    mock_task!(TaskB, "b", &[]);
    mock_task!(TaskC, "c", &[]);

    // Chain: DepA → DepB → DepC
    mock_task!(DepA, "dep-a", &[]);
    mock_task!(DepB, "dep-b", &[TypeId::of::<DepA>()]);
    mock_task!(DepC, "dep-c", &[TypeId::of::<DepB>()]);

    // Diamond: DiaA → DiaB + DiaC → DiaD
    mock_task!(DiaA, "dia-a", &[]);
    mock_task!(DiaB, "dia-b", &[TypeId::of::<DiaA>()]);
    mock_task!(DiaC, "dia-c", &[TypeId::of::<DiaA>()]);
    mock_task!(DiaD, "dia-d", &[TypeId::of::<DiaB>(), TypeId::of::<DiaC>()]);

    // Cyclic: CycA → CycB → CycA
    mock_task!(CycA, "cyc-a", &[TypeId::of::<CycB>()]);
    mock_task!(CycB, "cyc-b", &[TypeId::of::<CycA>()]);

    // Depends on a task that is never listed alongside it.
    mock_task!(MissingDep, "missing-dep", &[TypeId::of::<DepC>()]);

    fn names(tasks: &[&dyn Task]) -> Vec<String> {
        execution_order(tasks)
            .unwrap()
            .into_iter()
            .map(|i| tasks[i].name().to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // execution_order
    // -----------------------------------------------------------------------

    #[test]
    fn independent_tasks_keep_list_order() {
        let tasks: Vec<&dyn Task> = vec![&TaskB, &TaskA, &TaskC];
        assert_eq!(names(&tasks), ["b", "a", "c"]);
    }

    #[test]
    fn chain_listed_backwards_runs_forwards() {
        let tasks: Vec<&dyn Task> = vec![&DepC, &DepB, &DepA];
        assert_eq!(names(&tasks), ["dep-a", "dep-b", "dep-c"]);
    }

    #[test]
    fn diamond_runs_join_last() {
        let tasks: Vec<&dyn Task> = vec![&DiaD, &DiaC, &DiaB, &DiaA];
        let order = names(&tasks);
        assert_eq!(order.first().map(String::as_str), Some("dia-a"));
        assert_eq!(order.last().map(String::as_str), Some("dia-d"));
    }

    #[test]
    fn missing_dep_is_ignored() {
        let tasks: Vec<&dyn Task> = vec![&MissingDep, &TaskA];
        assert_eq!(names(&tasks), ["missing-dep", "a"]);
    }

    // -----------------------------------------------------------------------
    // has_cycle
    // -----------------------------------------------------------------------

    #[test]
    fn cycle_detected() {
        let tasks: Vec<&dyn Task> = vec![&CycA, &CycB];
        assert!(has_cycle(&tasks));
        assert!(execution_order(&tasks).is_none());
    }

    #[test]
    fn no_cycle_diamond() {
        let tasks: Vec<&dyn Task> = vec![&DiaA, &DiaB, &DiaC, &DiaD];
        assert!(!has_cycle(&tasks));
    }

    // -----------------------------------------------------------------------
    // install order: the real tasks form a valid DAG
    // -----------------------------------------------------------------------

    #[test]
    fn install_tasks_have_resolvable_dependencies() {
        use std::collections::HashSet;
        let tasks = crate::tasks::all_install_tasks();
        let present: HashSet<TypeId> = tasks.iter().map(|t| t.task_id()).collect();
        for task in &tasks {
            for dep in task.dependencies() {
                assert!(
                    present.contains(dep),
                    "task '{}' depends on a TypeId not in the task list",
                    task.name()
                );
            }
        }
    }

    #[test]
    fn install_order_commits_config_before_scheduling() {
        let tasks = crate::tasks::all_install_tasks();
        let refs: Vec<&dyn Task> = tasks.iter().map(Box::as_ref).collect();
        let order = names(&refs);
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("Install release") < pos("Check preconditions"));
        assert!(pos("Check preconditions") < pos("Merge configuration"));
        assert!(pos("Merge configuration") < pos("Configure scheduler"));
        assert!(pos("Merge configuration") < pos("Write recovery script"));
    }
}
