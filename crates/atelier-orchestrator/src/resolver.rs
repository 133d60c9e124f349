//! Dependency resolution - pure functions over a ceremony's task list
//!
//! No I/O and no async; everything here is deterministic and directly
//! testable. A dependency id that matches no task never resolves to
//! "satisfied", so such a task simply never becomes eligible.

use atelier_core::{Task, TaskStatus};
use std::collections::HashSet;

/// Tasks eligible for dispatch: pending, with every dependency complete.
///
/// Ordered by priority (high before medium before low), ties broken by
/// insertion order, so dispatch order is deterministic.
pub fn eligible(tasks: &[Task]) -> Vec<&str> {
    let complete: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Complete)
        .map(|t| t.task_id.as_str())
        .collect();

    let mut ready: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| t.dependencies.iter().all(|d| complete.contains(d.as_str())))
        .collect();

    // Stable sort keeps insertion order within a priority class.
    ready.sort_by_key(|t| t.priority);
    ready.iter().map(|t| t.task_id.as_str()).collect()
}

/// Pending tasks that can never run: some dependency is failed, missing, or
/// itself unsatisfiable.
pub fn unsatisfiable(tasks: &[Task]) -> Vec<&str> {
    // Fixpoint over the set of tasks that could still reach Complete.
    let mut completable: HashSet<&str> = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Complete | TaskStatus::InProgress))
        .map(|t| t.task_id.as_str())
        .collect();

    loop {
        let mut changed = false;
        for task in tasks {
            if task.status == TaskStatus::Pending
                && !completable.contains(task.task_id.as_str())
                && task
                    .dependencies
                    .iter()
                    .all(|d| completable.contains(d.as_str()))
            {
                completable.insert(task.task_id.as_str());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && !completable.contains(t.task_id.as_str()))
        .map(|t| t.task_id.as_str())
        .collect()
}

/// Whether the ceremony can make no further progress: nothing is running,
/// nothing is eligible, and not every task is complete.
///
/// With no work in flight the task map can only be changed by a dispatch, so
/// an empty eligible set means nothing will ever become eligible again.
pub fn is_stalled(tasks: &[Task]) -> bool {
    tasks.iter().all(|t| t.status != TaskStatus::InProgress)
        && !tasks.iter().all(|t| t.status == TaskStatus::Complete)
        && eligible(tasks).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::Priority;

    fn task(id: &str, status: TaskStatus, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id).with_dependencies(deps.iter().map(|s| s.to_string()).collect());
        t.status = status;
        t
    }

    #[test]
    fn test_no_dependencies_is_eligible() {
        let tasks = vec![task("a", TaskStatus::Pending, &[])];
        assert_eq!(eligible(&tasks), vec!["a"]);
    }

    #[test]
    fn test_unmet_dependency_gates() {
        let tasks = vec![
            task("a", TaskStatus::Pending, &[]),
            task("b", TaskStatus::Pending, &["a"]),
        ];
        assert_eq!(eligible(&tasks), vec!["a"]);

        let tasks = vec![
            task("a", TaskStatus::Complete, &[]),
            task("b", TaskStatus::Pending, &["a"]),
        ];
        assert_eq!(eligible(&tasks), vec!["b"]);
    }

    #[test]
    fn test_in_progress_dependency_is_not_satisfied() {
        let tasks = vec![
            task("a", TaskStatus::InProgress, &[]),
            task("b", TaskStatus::Pending, &["a"]),
        ];
        assert!(eligible(&tasks).is_empty());
    }

    #[test]
    fn test_failed_dependency_never_satisfies() {
        let tasks = vec![
            task("a", TaskStatus::Failed, &[]),
            task("b", TaskStatus::Pending, &["a"]),
        ];
        assert!(eligible(&tasks).is_empty());
        assert_eq!(unsatisfiable(&tasks), vec!["b"]);
    }

    #[test]
    fn test_missing_dependency_never_satisfies() {
        let tasks = vec![task("b", TaskStatus::Pending, &["ghost"])];
        assert!(eligible(&tasks).is_empty());
        assert_eq!(unsatisfiable(&tasks), vec!["b"]);
    }

    #[test]
    fn test_unsatisfiable_is_transitive() {
        let tasks = vec![
            task("a", TaskStatus::Failed, &[]),
            task("b", TaskStatus::Pending, &["a"]),
            task("c", TaskStatus::Pending, &["b"]),
            task("d", TaskStatus::Pending, &[]),
        ];
        assert_eq!(unsatisfiable(&tasks), vec!["b", "c"]);
    }

    #[test]
    fn test_priority_orders_dispatch() {
        let mut low = task("low", TaskStatus::Pending, &[]);
        low.priority = Priority::Low;
        let mut high = task("high", TaskStatus::Pending, &[]);
        high.priority = Priority::High;
        let medium = task("medium", TaskStatus::Pending, &[]);

        let tasks = vec![low, high, medium];
        assert_eq!(eligible(&tasks), vec!["high", "medium", "low"]);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let tasks = vec![
            task("first", TaskStatus::Pending, &[]),
            task("second", TaskStatus::Pending, &[]),
            task("third", TaskStatus::Pending, &[]),
        ];
        assert_eq!(eligible(&tasks), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_stalled_detection() {
        // Running work: not stalled.
        let tasks = vec![
            task("a", TaskStatus::InProgress, &[]),
            task("b", TaskStatus::Pending, &["ghost"]),
        ];
        assert!(!is_stalled(&tasks));

        // Nothing running, pending task can never run: stalled.
        let tasks = vec![
            task("a", TaskStatus::Complete, &[]),
            task("b", TaskStatus::Pending, &["ghost"]),
        ];
        assert!(is_stalled(&tasks));

        // Everything terminal but some failed: stalled (can never complete).
        let tasks = vec![
            task("a", TaskStatus::Complete, &[]),
            task("b", TaskStatus::Failed, &[]),
        ];
        assert!(is_stalled(&tasks));

        // All complete: finished, not stalled.
        let tasks = vec![task("a", TaskStatus::Complete, &[])];
        assert!(!is_stalled(&tasks));

        // Eligible work remains: not stalled.
        let tasks = vec![
            task("a", TaskStatus::Complete, &[]),
            task("b", TaskStatus::Pending, &["a"]),
        ];
        assert!(!is_stalled(&tasks));
    }
}
