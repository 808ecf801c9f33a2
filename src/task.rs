//! Task Model (4.G).
//!
//! Every action in the [`ConfigGraph`](crate::graph::ConfigGraph) expands
//! into two tasks the Solver schedules independently:
//!
//! * a **status task**, which checks whether the action's current version
//!   is already realised (cache hit, deployment already up to date, …)
//!   without running anything. Its dependencies are only the *status*
//!   tasks of the action's dependencies — checking status never needs a
//!   dependency to have actually executed.
//! * a **process task**, which performs the action's real work when the
//!   status task reports it's needed. It depends on its own status task
//!   (to short-circuit when already up to date) and on the *process*
//!   tasks of its dependencies (their outputs must exist before this
//!   action can run).
//!
//! Splitting the two lets the scheduler skip an entire subtree's process
//! tasks the moment a status check reports "up to date", while dependents
//! still see correct ordering because they depend on the process task,
//! which resolves immediately when skipped.

use std::fmt;

use crate::graph::ConfigGraph;
use crate::types::ActionRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Status,
    Process,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Status => "status",
            TaskType::Process => "process",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub action_ref: ActionRef,
    pub task_type: TaskType,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task_type, self.action_ref)
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub dependencies: Vec<TaskId>,
}

impl Task {
    pub fn is_status(&self) -> bool {
        self.id.task_type == TaskType::Status
    }

    pub fn is_process(&self) -> bool {
        self.id.task_type == TaskType::Process
    }
}

/// Expands every action in `graph` into its status/process task pair,
/// wiring dependencies per the module doc above.
pub fn tasks_for_graph(graph: &ConfigGraph) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(graph.len() * 2);
    for (action_ref, action) in graph.iter() {
        let status_deps: Vec<TaskId> = action
            .resolved_dependencies
            .iter()
            .map(|dep| TaskId { action_ref: dep.clone(), task_type: TaskType::Status })
            .collect();
        tasks.push(Task { id: TaskId { action_ref: action_ref.clone(), task_type: TaskType::Status }, dependencies: status_deps });

        let mut process_deps: Vec<TaskId> = vec![TaskId { action_ref: action_ref.clone(), task_type: TaskType::Status }];
        process_deps.extend(
            action
                .resolved_dependencies
                .iter()
                .map(|dep| TaskId { action_ref: dep.clone(), task_type: TaskType::Process }),
        );
        tasks.push(Task { id: TaskId { action_ref: action_ref.clone(), task_type: TaskType::Process }, dependencies: process_deps });
    }
    tasks
}
