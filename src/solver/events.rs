//! Typed lifecycle events the Solver broadcasts as tasks progress.
//! Consumers (the CLI's progress renderer, a future TUI) subscribe via
//! [`super::Solver::subscribe`] rather than polling task state.

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct GardenEvent {
    pub task_id: TaskId,
    pub state: TaskState,
}
