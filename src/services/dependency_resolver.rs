use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::TaskLedger;

/// Service for resolving task dependencies and detecting circular dependencies.
///
/// Stateless: every answer is computed from the ledger snapshot it is given.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    // Close the loop so the path reads A -> B -> A
                    path.push(neighbor);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub const fn new() -> Self {
        Self
    }

    /// Validate that every dependency names a task in `tasks`.
    pub fn validate_dependencies(&self, tasks: &[Task]) -> DomainResult<()> {
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        for task in tasks {
            if let Some(missing) = task.dependencies.iter().find(|d| !ids.contains(d)) {
                return Err(DomainError::UnknownDependency {
                    task: task.title.clone(),
                    dependency: missing.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Detect circular dependencies in a set of tasks.
    ///
    /// Returns the cycle path with the first node repeated at the end.
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph
                .entry(task.id)
                .or_default()
                .extend(task.dependencies.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        // Walk in creation order so the reported cycle is deterministic
        for task in tasks {
            if !visited.contains(&task.id)
                && detect_cycle_util(task.id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Reject a task set whose dependency graph is not a DAG.
    pub fn ensure_acyclic(&self, tasks: &[Task]) -> DomainResult<()> {
        self.validate_dependencies(tasks)?;
        match self.detect_cycle(tasks) {
            Some(cycle) => Err(DomainError::CyclicDependency(cycle)),
            None => Ok(()),
        }
    }

    /// Perform topological sort on tasks based on dependencies.
    ///
    /// Dependencies come before dependents; independent tasks keep creation order.
    pub fn topological_sort(&self, tasks: &[Task]) -> DomainResult<Vec<Task>> {
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(DomainError::CyclicDependency(cycle));
        }

        let known: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for task in tasks {
            let degree = in_degree.entry(task.id).or_insert(0);
            for dep_id in task.dependencies.iter().filter(|d| known.contains(d)) {
                *degree += 1;
                graph.entry(*dep_id).or_default().push(task.id);
            }
        }

        // Kahn's algorithm
        let mut queue: VecDeque<Uuid> = tasks
            .iter()
            .filter(|t| in_degree.get(&t.id) == Some(&0))
            .map(|t| t.id)
            .collect();
        let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        let mut sorted = Vec::with_capacity(tasks.len());

        while let Some(node_id) = queue.pop_front() {
            if let Some(task) = by_id.get(&node_id) {
                sorted.push((*task).clone());
            }
            if let Some(neighbors) = graph.get(&node_id) {
                for neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*neighbor);
                        }
                    }
                }
            }
        }

        Ok(sorted)
    }

    /// Length of the longest dependency chain below `task` (0 = no dependencies).
    pub fn calculate_depth(&self, task: &Task, all_tasks: &[Task]) -> DomainResult<u32> {
        let task_map: HashMap<Uuid, &Task> = all_tasks.iter().map(|t| (t.id, t)).collect();
        let mut visited = HashSet::new();
        calculate_depth_recursive(task, &task_map, &mut visited)
    }

    /// Pending tasks whose dependencies are all `Completed`.
    pub fn ready_tasks<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let status: HashMap<Uuid, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|d| status.get(d) == Some(&TaskStatus::Completed))
            })
            .collect()
    }

    /// The ready set of a goal, read from the ledger.
    pub async fn ready_set(
        &self,
        ledger: &dyn TaskLedger,
        goal_id: Uuid,
    ) -> DomainResult<Vec<Uuid>> {
        let tasks = ledger.list(goal_id).await?;
        Ok(self.ready_tasks(&tasks).into_iter().map(|t| t.id).collect())
    }

    /// Number of non-terminal tasks that directly depend on each task.
    pub fn outstanding_dependents(&self, tasks: &[Task]) -> HashMap<Uuid, usize> {
        let mut counts: HashMap<Uuid, usize> = tasks.iter().map(|t| (t.id, 0)).collect();
        for task in tasks.iter().filter(|t| !t.is_terminal()) {
            for dep in &task.dependencies {
                if let Some(count) = counts.get_mut(dep) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Status corrections needed so `Blocked` mirrors upstream failure.
    ///
    /// A task is doomed when it is failed or killed, or when it waits on a
    /// doomed dependency. Pending doomed tasks become `Blocked`; blocked tasks
    /// that are no longer doomed return to `Pending`.
    pub fn blocking_updates(&self, tasks: &[Task]) -> DomainResult<Vec<(Uuid, TaskStatus)>> {
        let ordered = self.topological_sort(tasks)?;
        let mut doomed: HashSet<Uuid> = HashSet::new();
        let mut updates = Vec::new();

        for task in &ordered {
            let upstream_doomed = task.dependencies.iter().any(|d| doomed.contains(d));
            match task.status {
                TaskStatus::Failed | TaskStatus::Killed => {
                    doomed.insert(task.id);
                }
                TaskStatus::Pending if upstream_doomed => {
                    doomed.insert(task.id);
                    updates.push((task.id, TaskStatus::Blocked));
                }
                TaskStatus::Blocked if upstream_doomed => {
                    doomed.insert(task.id);
                }
                TaskStatus::Blocked => updates.push((task.id, TaskStatus::Pending)),
                _ => {}
            }
        }

        Ok(updates)
    }
}

// Standalone helper for depth calculation
fn calculate_depth_recursive(
    task: &Task,
    task_map: &HashMap<Uuid, &Task>,
    visited: &mut HashSet<Uuid>,
) -> DomainResult<u32> {
    if !visited.insert(task.id) {
        return Err(DomainError::CyclicDependency(vec![task.id, task.id]));
    }

    let mut max_depth = 0;
    for dep_id in &task.dependencies {
        if let Some(&dep_task) = task_map.get(dep_id) {
            let depth = calculate_depth_recursive(dep_task, task_map, visited)?;
            max_depth = max_depth.max(depth + 1);
        }
    }

    visited.remove(&task.id);
    Ok(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_task(title: &str, dependencies: &[Uuid]) -> Task {
        let mut task = Task::new(Uuid::nil(), title, "Description");
        task.dependencies = dependencies.to_vec();
        task
    }

    #[test]
    fn test_validate_dependencies_missing() {
        let resolver = DependencyResolver::new();
        let task = create_test_task("a", &[Uuid::new_v4()]);
        assert!(matches!(
            resolver.validate_dependencies(&[task]),
            Err(DomainError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_detect_cycle_no_cycle() {
        let resolver = DependencyResolver::new();
        let task1 = create_test_task("a", &[]);
        let task2 = create_test_task("b", &[task1.id]);
        assert!(resolver.detect_cycle(&[task1, task2]).is_none());
    }

    #[test]
    fn test_detect_cycle_with_cycle() {
        let resolver = DependencyResolver::new();
        let mut task1 = create_test_task("a", &[]);
        let task2 = create_test_task("b", &[task1.id]);
        task1.dependencies.push(task2.id);

        let cycle = resolver.detect_cycle(&[task1.clone(), task2.clone()]).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&task1.id) && cycle.contains(&task2.id));
        assert!(matches!(
            resolver.ensure_acyclic(&[task1, task2]),
            Err(DomainError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_topological_sort_simple() {
        let resolver = DependencyResolver::new();
        let task1 = create_test_task("a", &[]);
        let task2 = create_test_task("b", &[task1.id]);
        let task3 = create_test_task("c", &[task2.id]);

        let sorted = resolver
            .topological_sort(&[task3.clone(), task1.clone(), task2.clone()])
            .unwrap();

        let ids: Vec<Uuid> = sorted.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![task1.id, task2.id, task3.id]);
    }

    #[test]
    fn test_calculate_depth() {
        let resolver = DependencyResolver::new();
        let task1 = create_test_task("a", &[]);
        let task2 = create_test_task("b", &[task1.id]);
        let task3 = create_test_task("c", &[task2.id, task1.id]);
        let all = vec![task1.clone(), task2.clone(), task3.clone()];

        assert_eq!(resolver.calculate_depth(&task1, &all).unwrap(), 0);
        assert_eq!(resolver.calculate_depth(&task2, &all).unwrap(), 1);
        assert_eq!(resolver.calculate_depth(&task3, &all).unwrap(), 2);
    }

    #[test]
    fn test_ready_tasks_requires_completed_dependencies() {
        let resolver = DependencyResolver::new();
        let mut a = create_test_task("a", &[]);
        let mut b = create_test_task("b", &[]);
        let c = create_test_task("c", &[a.id, b.id]);

        let tasks = [a.clone(), b.clone(), c.clone()];
        let ready: Vec<&str> = resolver
            .ready_tasks(&tasks)
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(ready, vec!["a", "b"]);

        a.status = TaskStatus::Completed;
        b.status = TaskStatus::InProgress;
        let tasks = [a.clone(), b.clone(), c.clone()];
        let ready = resolver.ready_tasks(&tasks);
        assert!(ready.is_empty());

        b.status = TaskStatus::Completed;
        let tasks = [a, b, c.clone()];
        let ready = resolver.ready_tasks(&tasks);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, c.id);
    }

    #[test]
    fn test_killed_and_blocked_tasks_never_ready() {
        let resolver = DependencyResolver::new();
        let mut a = create_test_task("a", &[]);
        a.status = TaskStatus::Killed;
        let mut b = create_test_task("b", &[]);
        b.status = TaskStatus::Blocked;
        assert!(resolver.ready_tasks(&[a, b]).is_empty());
    }

    #[test]
    fn test_blocking_updates_propagate_transitively() {
        let resolver = DependencyResolver::new();
        let mut a = create_test_task("a", &[]);
        a.status = TaskStatus::Failed;
        let b = create_test_task("b", &[a.id]);
        let c = create_test_task("c", &[b.id]);
        let d = create_test_task("d", &[]);

        let updates = resolver
            .blocking_updates(&[a.clone(), b.clone(), c.clone(), d])
            .unwrap();
        assert_eq!(
            updates,
            vec![(b.id, TaskStatus::Blocked), (c.id, TaskStatus::Blocked)]
        );
    }

    #[test]
    fn test_blocking_updates_release_after_requeue() {
        let resolver = DependencyResolver::new();
        let a = create_test_task("a", &[]);
        let mut b = create_test_task("b", &[a.id]);
        b.status = TaskStatus::Blocked;

        let updates = resolver.blocking_updates(&[a, b.clone()]).unwrap();
        assert_eq!(updates, vec![(b.id, TaskStatus::Pending)]);
    }

    #[test]
    fn test_outstanding_dependents_ignore_terminal_dependents() {
        let resolver = DependencyResolver::new();
        let a = create_test_task("a", &[]);
        let b = create_test_task("b", &[a.id]);
        let mut c = create_test_task("c", &[a.id]);
        c.status = TaskStatus::Completed;

        let counts = resolver.outstanding_dependents(&[a.clone(), b, c]);
        assert_eq!(counts[&a.id], 1);
    }
}
