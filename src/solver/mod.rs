//! Solver / Graph Executor (4.H).
//!
//! Expands a [`ConfigGraph`] into status/process tasks (see
//! [`crate::task`]), then runs them with a concurrency-limited worker
//! pool: a task is dispatched the moment its dependencies resolve,
//! regardless of where it sits in the original action order — the same
//! work-stealing shape as a `tokio::task::JoinSet` draining a
//! dependency-ordered ready queue rather than a fixed pipeline.
//!
//! A process task whose status task reports the cached version is
//! already realised short-circuits to the cached outputs without
//! invoking a handler. A process task that does need to run goes through
//! [`run_with_retries`]: timeout-bounded, retried with exponential
//! backoff on handler failure up to [`ResourceLimits::max_retries`], and
//! gated by a per-handler [`CircuitBreaker`].

mod events;

pub use events::{GardenEvent, TaskState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::cache::ResultCache;
use crate::error::{GardenError, TimeoutError, TransientError};
use crate::graph::ConfigGraph;
use crate::limits::{CircuitBreaker, ResourceLimits};
use crate::plugin::Registry;
use crate::task::{tasks_for_graph, Task, TaskId, TaskType};
use crate::types::{ActionKind, CacheKey};

/// Cooperative cancellation flag shared between the caller and the
/// Solver's scheduling loop. Tasks already dispatched are given
/// `grace_period` to finish normally; once it elapses the Solver detaches
/// them (lets them keep running, but reports them `Aborted` and returns).
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        CancelHandle::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    StatusReady,
    StatusUpToDate { outputs: serde_json::Value },
    ProcessCompleted { outputs: serde_json::Value },
    Failed { message: String },
    Aborted,
}

impl TaskOutcome {
    fn is_terminal_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. } | TaskOutcome::Aborted)
    }
}

pub struct SolverReport {
    pub outcomes: HashMap<TaskId, TaskOutcome>,
}

impl SolverReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes.values().all(|o| !o.is_terminal_failure())
    }
}

pub struct Solver {
    graph: Arc<ConfigGraph>,
    registry: Arc<Registry>,
    cache: Arc<ResultCache>,
    limits: ResourceLimits,
    breaker: Arc<CircuitBreaker>,
    events: broadcast::Sender<GardenEvent>,
    grace_period: Duration,
}

impl Solver {
    pub fn new(graph: Arc<ConfigGraph>, registry: Arc<Registry>, cache: Arc<ResultCache>, limits: ResourceLimits) -> Self {
        let (events, _) = broadcast::channel(1024);
        Solver {
            graph,
            registry,
            cache,
            breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(60))),
            limits,
            events,
            grace_period: Duration::from_secs(10),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GardenEvent> {
        self.events.subscribe()
    }

    pub async fn run(&self, cancel: CancelHandle) -> Result<SolverReport, GardenError> {
        let tasks = tasks_for_graph(&self.graph);
        let task_map: HashMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();

        let mut in_degree: HashMap<TaskId, usize> = task_map.keys().cloned().map(|id| (id, 0)).collect();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in task_map.values() {
            *in_degree.get_mut(&task.id).expect("task indexed") = task.dependencies.len();
            for dep in &task.dependencies {
                dependents.entry(dep.clone()).or_default().push(task.id.clone());
            }
        }

        let mut ready: Vec<TaskId> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
        ready.sort_by_key(|id| ready_priority(&task_map, id));

        let mut outcomes: HashMap<TaskId, TaskOutcome> = HashMap::new();
        let mut join_set = tokio::task::JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, TaskId> = HashMap::new();

        loop {
            if !cancel.is_cancelled() {
                while in_flight.len() < self.limits.max_concurrency.max(1) {
                    let Some(next) = pop_lowest_priority(&mut ready, &task_map) else { break };
                    let task = task_map.get(&next).expect("ready task indexed").clone();

                    if task.dependencies.iter().any(|d| outcomes.get(d).map(|o| o.is_terminal_failure()).unwrap_or(false)) {
                        outcomes.insert(next.clone(), TaskOutcome::Aborted);
                        self.emit(next.clone(), TaskState::Aborted);
                        requeue_dependents(&next, &mut dependents, &mut in_degree, &mut ready, &task_map);
                        continue;
                    }

                    self.emit(next.clone(), TaskState::Running);
                    let graph = self.graph.clone();
                    let registry = self.registry.clone();
                    let cache = self.cache.clone();
                    let breaker = self.breaker.clone();
                    let limits = self.limits;
                    let status_outcome = if task.is_process() {
                        outcomes.get(&TaskId { action_ref: next.action_ref.clone(), task_type: TaskType::Status }).cloned()
                    } else {
                        None
                    };
                    let handle = join_set.spawn(async move { execute(task, graph, registry, cache, breaker, limits, status_outcome).await });
                    in_flight.insert(handle.id(), next);
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let join_result = if cancel.is_cancelled() {
                match tokio::time::timeout(self.grace_period, join_set.join_next()).await {
                    Ok(r) => r,
                    Err(_elapsed) => {
                        for task_id in in_flight.values() {
                            outcomes.entry(task_id.clone()).or_insert(TaskOutcome::Aborted);
                            self.emit(task_id.clone(), TaskState::Aborted);
                        }
                        join_set.detach_all();
                        break;
                    }
                }
            } else {
                join_set.join_next().await
            };

            let Some(result) = join_result else { continue };
            let (finished_id, joined) = match result {
                Ok((id, outcome)) => (id, outcome),
                Err(join_err) => {
                    let id = in_flight.remove(&join_err.id()).unwrap_or_else(|| panic!("unknown joined task"));
                    (id, TaskOutcome::Failed { message: join_err.to_string() })
                }
            };
            in_flight.retain(|_, v| v != &finished_id);

            self.emit(finished_id.clone(), outcome_state(&joined));
            outcomes.insert(finished_id.clone(), joined);
            requeue_dependents(&finished_id, &mut dependents, &mut in_degree, &mut ready, &task_map);
        }

        Ok(SolverReport { outcomes })
    }

    fn emit(&self, id: TaskId, state: TaskState) {
        let _ = self.events.send(GardenEvent { task_id: id, state });
    }
}

fn outcome_state(outcome: &TaskOutcome) -> TaskState {
    match outcome {
        TaskOutcome::StatusReady | TaskOutcome::StatusUpToDate { .. } | TaskOutcome::ProcessCompleted { .. } => TaskState::Completed,
        TaskOutcome::Failed { .. } => TaskState::Failed,
        TaskOutcome::Aborted => TaskState::Aborted,
    }
}

fn ready_priority(task_map: &HashMap<TaskId, Task>, id: &TaskId) -> (u8, u8, String) {
    let _ = task_map;
    let type_rank = match id.task_type {
        TaskType::Status => 0,
        TaskType::Process => 1,
    };
    (type_rank, id.action_ref.kind.priority(), id.action_ref.name.to_string())
}

fn pop_lowest_priority(ready: &mut Vec<TaskId>, task_map: &HashMap<TaskId, Task>) -> Option<TaskId> {
    if ready.is_empty() {
        return None;
    }
    ready.sort_by_key(|id| ready_priority(task_map, id));
    Some(ready.remove(0))
}

fn requeue_dependents(
    finished: &TaskId,
    dependents: &mut HashMap<TaskId, Vec<TaskId>>,
    in_degree: &mut HashMap<TaskId, usize>,
    ready: &mut Vec<TaskId>,
    task_map: &HashMap<TaskId, Task>,
) {
    let Some(waiting) = dependents.get(finished) else { return };
    for dependent in waiting.clone() {
        if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
            if *degree == 0 && task_map.contains_key(&dependent) {
                ready.push(dependent);
            }
        }
    }
}

async fn execute(
    task: Task,
    graph: Arc<ConfigGraph>,
    registry: Arc<Registry>,
    cache: Arc<ResultCache>,
    breaker: Arc<CircuitBreaker>,
    limits: ResourceLimits,
    status_outcome: Option<TaskOutcome>,
) -> (TaskId, TaskOutcome) {
    let id = task.id.clone();
    let Some(action) = graph.get(&task.id.action_ref) else {
        return (id, TaskOutcome::Failed { message: format!("action `{}` missing from graph", task.id.action_ref) });
    };

    match task.id.task_type {
        TaskType::Status => {
            let key = CacheKey { kind: action.action_ref().kind, name: action.action_ref().name, version: action.version.clone(), mode: action.mode() };
            match cache.get(&key).await {
                Ok(Some(entry)) => (id, TaskOutcome::StatusUpToDate { outputs: entry.outputs }),
                Ok(None) => (id, TaskOutcome::StatusReady),
                Err(e) => (id, TaskOutcome::Failed { message: e.to_string() }),
            }
        }
        TaskType::Process => {
            if let Some(TaskOutcome::StatusUpToDate { outputs }) = status_outcome {
                return (id, TaskOutcome::ProcessCompleted { outputs });
            }

            let handler_name = handler_name_for(action.config.kind);
            let Some(handler) = registry.find_handler(&action.config.type_, action.config.kind, &action.config.type_, handler_name) else {
                return (id, TaskOutcome::Failed { message: format!("no `{handler_name}` handler registered for type `{}`", action.config.type_) });
            };

            let args = serde_json::to_value(&action.config.spec).unwrap_or(serde_json::Value::Null);
            let result = run_with_retries(&handler, &action.config, &args, &breaker, limits, action.resolved_timeout, handler_name).await;

            match result {
                Ok(outputs) => {
                    let key = CacheKey { kind: action.action_ref().kind, name: action.action_ref().name, version: action.version.clone(), mode: action.mode() };
                    if let Err(e) = cache.put(&key, outputs.clone()).await {
                        return (id, TaskOutcome::Failed { message: e.to_string() });
                    }
                    (id, TaskOutcome::ProcessCompleted { outputs })
                }
                Err(e) => (id, TaskOutcome::Failed { message: e.to_string() }),
            }
        }
    }
}

fn handler_name_for(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Build => "build",
        ActionKind::Deploy => "deploy",
        ActionKind::Run => "run",
        ActionKind::Test => "test",
    }
}

async fn run_with_retries(
    handler: &Arc<dyn crate::plugin::Handler>,
    action_config: &crate::config::ActionConfig,
    args: &serde_json::Value,
    breaker: &CircuitBreaker,
    limits: ResourceLimits,
    timeout_secs: u64,
    handler_name: &'static str,
) -> Result<serde_json::Value, GardenError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        if !breaker.allow(handler_name) {
            return Err(TransientError { message: "circuit breaker open".into(), handler: handler_name.into(), attempt }.into());
        }

        let invocation = handler.invoke(action_config, args);
        match tokio::time::timeout(Duration::from_secs(timeout_secs), invocation).await {
            Ok(Ok(value)) => {
                breaker.record_success(handler_name);
                return Ok(value);
            }
            Ok(Err(plugin_err)) => {
                breaker.record_failure(handler_name);
                if attempt >= limits.max_retries {
                    return Err(plugin_err.into());
                }
                tokio::time::sleep(limits.backoff_for_attempt(attempt)).await;
            }
            Err(_elapsed) => {
                breaker.record_failure(handler_name);
                return Err(TimeoutError { kind: action_config.kind.to_string(), name: action_config.name.clone(), timeout_secs }.into());
            }
        }
    }
}
