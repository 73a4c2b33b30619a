/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Execution Engine
//!
//! Orchestrates one run of a workflow DAG: selects the runnable subset,
//! resolves parameters per task just-in-time, dispatches tasks to their
//! runners layer by layer, tracks states and emits alert events.
//!
//! ## Scheduling model
//!
//! Tasks within a layer run concurrently under a bounded semaphore; a layer
//! is a hard barrier — the next layer does not start until the current one
//! has fully drained, failures included. For every edge `u -> v`, `v` starts
//! strictly after `u` reached a terminal state. Under fail-fast the first
//! failure cancels all not-yet-started tasks once its layer drains.
//!
//! ## State machine
//!
//! PENDING -> RUNNING -> SUCCEEDED | FAILED, with PENDING -> SKIPPED for
//! filtered tasks and PENDING -> CANCELLED for fail-fast and aborts.
//! Terminal states never revert; the registry refuses such transitions.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::{AlertEmitter, AlertEvent};
use crate::dates;
use crate::error::{EngineError, TaskError, ValidationError};
use crate::params::{ParamMap, ParamStore, TemplateResolver};
use crate::runner::{RunnerRegistry, TaskOutput, TaskRunner};
use crate::task::TaskSpec;
use crate::workflow::Workflow;

/// Lifecycle state of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Skipped => "SKIPPED",
            TaskState::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on concurrently running tasks within a layer.
    pub max_parallel_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Per-run selection and labelling options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Execute only these tasks; everything else is SKIPPED. The engine does
    /// not pull in ancestors.
    pub only_tasks: Option<Vec<String>>,
    /// Execute this task and its downstream closure. Ignored when
    /// `only_tasks` is present.
    pub start_from: Option<String>,
    /// Execute this task and its upstream closure.
    pub end_at: Option<String>,
    /// Backfill date label carried into alert events.
    pub backfill_date: Option<NaiveDate>,
}

/// Cooperative abort signal shared with the engine.
///
/// Aborting marks not-yet-started tasks CANCELLED; tasks already running are
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final record for one task within a run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub state: TaskState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// Truncated captured stdout/stderr.
    pub log: String,
    pub error: Option<String>,
}

impl TaskOutcome {
    fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            exit_code: None,
            log: String::new(),
            error: None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// The result of one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub run_id: Uuid,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: BTreeMap<String, TaskOutcome>,
}

impl WorkflowOutcome {
    /// Aggregate success: every non-skipped task succeeded.
    pub fn success(&self) -> bool {
        self.tasks
            .values()
            .filter(|t| t.state != TaskState::Skipped)
            .all(|t| t.state == TaskState::Succeeded)
    }

    pub fn tasks_in_state(&self, state: TaskState) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.state == state)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Serialised writer over the per-run task state table.
struct StateRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    tasks: BTreeMap<String, TaskOutcome>,
    failed_order: Vec<String>,
}

impl StateRegistry {
    fn new(task_ids: Vec<String>) -> Self {
        let tasks = task_ids
            .into_iter()
            .map(|id| (id, TaskOutcome::pending()))
            .collect();
        Self {
            inner: Mutex::new(RegistryInner {
                tasks,
                failed_order: Vec::new(),
            }),
        }
    }

    fn state(&self, task_id: &str) -> TaskState {
        self.inner.lock().unwrap().tasks[task_id].state
    }

    /// Move a task into `state`, refusing to leave terminal states.
    fn set_state(&self, task_id: &str, state: TaskState) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(outcome) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        if outcome.state.is_terminal() {
            warn!(
                task = task_id,
                from = %outcome.state,
                to = %state,
                "ignoring transition out of terminal state"
            );
            return false;
        }
        outcome.state = state;
        match state {
            TaskState::Running => outcome.started_at = Some(Utc::now()),
            s if s.is_terminal() => outcome.finished_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    fn record_result(&self, task_id: &str, result: &Result<TaskOutput, TaskError>) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let Some(outcome) = inner.tasks.get_mut(task_id) else {
            return;
        };
        if outcome.state.is_terminal() {
            warn!(task = task_id, "ignoring result for task already terminal");
            return;
        }
        outcome.finished_at = Some(Utc::now());
        match result {
            Ok(output) => {
                outcome.state = TaskState::Succeeded;
                outcome.exit_code = Some(output.exit_code);
                outcome.log = join_streams(output);
            }
            Err(TaskError::NonZeroExit { output }) => {
                outcome.state = TaskState::Failed;
                outcome.exit_code = Some(output.exit_code);
                outcome.log = join_streams(output);
                outcome.error = Some(format!("command exited with status {}", output.exit_code));
                inner.failed_order.push(task_id.to_string());
            }
            Err(e) => {
                outcome.state = TaskState::Failed;
                outcome.error = Some(e.to_string());
                inner.failed_order.push(task_id.to_string());
            }
        }
    }

    fn record_join_failure(&self, task_id: &str, message: String) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if let Some(outcome) = inner.tasks.get_mut(task_id) {
            if outcome.state.is_terminal() {
                return;
            }
            outcome.state = TaskState::Failed;
            outcome.finished_at = Some(Utc::now());
            outcome.error = Some(message);
            inner.failed_order.push(task_id.to_string());
        }
    }

    /// Cancel every task still PENDING, returning the affected IDs.
    fn cancel_pending(&self) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut cancelled = Vec::new();
        for (id, outcome) in inner.tasks.iter_mut() {
            if outcome.state == TaskState::Pending {
                outcome.state = TaskState::Cancelled;
                outcome.finished_at = Some(now);
                cancelled.push(id.clone());
            }
        }
        cancelled
    }

    fn any_failed(&self) -> bool {
        !self.inner.lock().unwrap().failed_order.is_empty()
    }

    fn first_failed(&self) -> Option<String> {
        self.inner.lock().unwrap().failed_order.first().cloned()
    }

    fn into_tasks(self) -> BTreeMap<String, TaskOutcome> {
        self.inner.into_inner().unwrap().tasks
    }
}

fn join_streams(output: &TaskOutput) -> String {
    if output.stderr.is_empty() {
        output.stdout.clone()
    } else if output.stdout.is_empty() {
        output.stderr.clone()
    } else {
        format!("{}\n--- stderr ---\n{}", output.stdout, output.stderr)
    }
}

/// Drives workflow runs against a runner registry.
pub struct Engine {
    config: EngineConfig,
    runners: Arc<RunnerRegistry>,
    emitter: Option<Arc<AlertEmitter>>,
    abort: AbortHandle,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            runners: Arc::new(RunnerRegistry::with_defaults()),
            emitter: None,
            abort: AbortHandle::new(),
        }
    }

    /// Replace the runner registry, e.g. with mocks in tests.
    pub fn with_runners(mut self, runners: Arc<RunnerRegistry>) -> Self {
        self.runners = runners;
        self
    }

    /// Install an alert emitter, overriding the workflow's alert block.
    pub fn with_emitter(mut self, emitter: AlertEmitter) -> Self {
        self.emitter = Some(Arc::new(emitter));
        self
    }

    /// A handle that aborts this engine's current and future runs.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Execute one run of `workflow` under the given runtime overlay.
    ///
    /// Individual task failures do not error the call; they are recorded in
    /// the returned [`WorkflowOutcome`].
    pub async fn run(
        &self,
        workflow: &Workflow,
        overlay: &ParamMap,
        options: &RunOptions,
    ) -> Result<WorkflowOutcome, EngineError> {
        workflow.validate()?;
        let layers = workflow.execution_layers()?;
        let selected = self.select_tasks(workflow, options)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            workflow = workflow.name(),
            run_id = %run_id,
            tasks = workflow.task_count(),
            layers = layers.len(),
            "starting workflow run"
        );

        let registry = StateRegistry::new(workflow.task_ids());
        for id in workflow.task_ids() {
            if !selected.contains(&id) {
                registry.set_state(&id, TaskState::Skipped);
                debug!(task = id.as_str(), "task excluded by filter");
            }
        }
        for id in &selected {
            for pred in workflow.predecessors(id) {
                if !selected.contains(pred) {
                    warn!(
                        task = id.as_str(),
                        upstream = pred.as_str(),
                        "upstream task excluded from this run; treating it as satisfied"
                    );
                }
            }
        }

        let reference = self.reference_instant(overlay);
        let emitter = self.resolve_emitter(workflow);
        if let Some(emitter) = &emitter {
            emitter
                .emit(&AlertEvent::WorkflowStarted {
                    workflow: workflow.name().to_string(),
                    started_at,
                    backfill_date: options.backfill_date,
                })
                .await;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tasks.max(1)));
        'layers: for layer in &layers {
            if self.abort.is_aborted() {
                warn!(workflow = workflow.name(), "run aborted; cancelling remaining tasks");
                registry.cancel_pending();
                break;
            }

            let mut to_run = Vec::new();
            for id in layer {
                if registry.state(id) != TaskState::Pending {
                    continue;
                }
                let blocked = workflow.predecessors(id).iter().any(|pred| {
                    matches!(
                        registry.state(pred),
                        TaskState::Failed | TaskState::Cancelled
                    )
                });
                if blocked {
                    registry.set_state(id, TaskState::Cancelled);
                    info!(task = id.as_str(), "cancelled: upstream task did not succeed");
                } else {
                    to_run.push(id.clone());
                }
            }
            if to_run.is_empty() {
                continue;
            }
            info!(tasks = ?to_run, "dispatching layer");

            let mut handles = Vec::with_capacity(to_run.len());
            for id in to_run {
                let permit = semaphore.clone().acquire_owned().await?;
                let task = workflow
                    .task(&id)
                    .cloned()
                    .ok_or_else(|| ValidationError::UnknownTask(id.clone()))?;
                let runner = self.runners.get(task.kind.name());
                let overlay = overlay.clone();
                let globals = workflow.globals().clone();

                registry.set_state(&id, TaskState::Running);
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    execute_task(task, overlay, globals, reference, runner).await
                });
                handles.push((id, handle));
            }

            // Layer barrier: wait for every in-flight task before moving on.
            for (id, handle) in handles {
                match handle.await {
                    Ok(result) => {
                        registry.record_result(&id, &result);
                        match &result {
                            Ok(output) => {
                                info!(
                                    task = id.as_str(),
                                    duration_ms = output.duration.as_millis() as u64,
                                    "task succeeded"
                                );
                                if let Some(emitter) = &emitter {
                                    emitter
                                        .emit(&AlertEvent::TaskSucceeded {
                                            workflow: workflow.name().to_string(),
                                            task_id: id.clone(),
                                            duration: output.duration,
                                        })
                                        .await;
                                }
                            }
                            Err(e) => {
                                error!(task = id.as_str(), error = %e, "task failed");
                                if let Some(emitter) = &emitter {
                                    emitter
                                        .emit(&AlertEvent::TaskFailed {
                                            workflow: workflow.name().to_string(),
                                            task_id: id.clone(),
                                            error: e.to_string(),
                                        })
                                        .await;
                                }
                            }
                        }
                    }
                    Err(join_err) => {
                        error!(task = id.as_str(), error = %join_err, "task aborted unexpectedly");
                        registry.record_join_failure(&id, format!("task aborted: {}", join_err));
                    }
                }
            }

            if registry.any_failed() && workflow.fail_fast() {
                let cancelled = registry.cancel_pending();
                if !cancelled.is_empty() {
                    warn!(?cancelled, "fail-fast: cancelling not-yet-started tasks");
                }
                break 'layers;
            }
        }

        if self.abort.is_aborted() {
            registry.cancel_pending();
        }

        let failed_task = registry.first_failed();
        let finished_at = Utc::now();
        let outcome = WorkflowOutcome {
            run_id,
            workflow: workflow.name().to_string(),
            started_at,
            finished_at,
            tasks: registry.into_tasks(),
        };

        if let Some(emitter) = &emitter {
            let event = if outcome.success() {
                AlertEvent::WorkflowSucceeded {
                    workflow: workflow.name().to_string(),
                    started_at,
                    completed: outcome.tasks_in_state(TaskState::Succeeded),
                    backfill_date: options.backfill_date,
                }
            } else {
                AlertEvent::WorkflowFailed {
                    workflow: workflow.name().to_string(),
                    started_at,
                    error: failed_task
                        .as_ref()
                        .and_then(|id| outcome.tasks.get(id))
                        .and_then(|t| t.error.clone())
                        .unwrap_or_else(|| "workflow did not complete".to_string()),
                    failed_task,
                    completed: outcome.tasks_in_state(TaskState::Succeeded),
                    cancelled: outcome.tasks_in_state(TaskState::Cancelled),
                    backfill_date: options.backfill_date,
                }
            };
            emitter.emit(&event).await;
        }

        info!(
            workflow = workflow.name(),
            run_id = %run_id,
            success = outcome.success(),
            "workflow run finished"
        );
        Ok(outcome)
    }

    /// Resolve the set of tasks this run will execute.
    fn select_tasks(
        &self,
        workflow: &Workflow,
        options: &RunOptions,
    ) -> Result<HashSet<String>, EngineError> {
        if let Some(only) = &options.only_tasks {
            if options.start_from.is_some() {
                warn!("both only_tasks and start_from given; using only_tasks");
            }
            let mut selected = HashSet::new();
            for id in only {
                if !workflow.contains_task(id) {
                    return Err(ValidationError::UnknownTask(id.clone()).into());
                }
                selected.insert(id.clone());
            }
            return Ok(selected);
        }

        let mut selected: HashSet<String> = workflow.task_ids().into_iter().collect();
        if let Some(start) = &options.start_from {
            let downstream = workflow.downstream_closure(start)?;
            selected.retain(|id| downstream.contains(id));
        }
        if let Some(end) = &options.end_at {
            let upstream = workflow.upstream_closure(end)?;
            selected.retain(|id| upstream.contains(id));
        }
        Ok(selected)
    }

    /// The run's reference instant for date expressions: engine start, with
    /// the date portion overridable through the `ref_date` runtime parameter.
    fn reference_instant(&self, overlay: &ParamMap) -> NaiveDateTime {
        let now = Local::now().naive_local();
        match overlay.get("ref_date") {
            None => now,
            Some(raw) => match dates::parse_iso_date(raw) {
                Ok(date) => date.and_hms_opt(0, 0, 0).unwrap_or(now),
                Err(_) => {
                    warn!(ref_date = raw, "invalid ref_date override; using system date");
                    now
                }
            },
        }
    }

    fn resolve_emitter(&self, workflow: &Workflow) -> Option<Arc<AlertEmitter>> {
        if let Some(emitter) = &self.emitter {
            return Some(emitter.clone());
        }
        workflow
            .alert()
            .and_then(AlertEmitter::from_config)
            .map(Arc::new)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the task's parameters just-in-time and hand it to its runner.
async fn execute_task(
    task: TaskSpec,
    overlay: ParamMap,
    globals: ParamMap,
    reference: NaiveDateTime,
    runner: Option<Arc<dyn TaskRunner>>,
) -> Result<TaskOutput, TaskError> {
    let Some(runner) = runner else {
        return Err(TaskError::NoRunner(task.kind.name().to_string()));
    };

    let mut resolved = ParamMap::new();
    {
        let store = ParamStore::layered(vec![&overlay, &task.params, &globals]);
        let resolver = TemplateResolver::new(store, reference);
        for (key, value) in task.params.iter() {
            resolved.insert(key, resolver.resolve(value));
        }
    }

    let store = ParamStore::layered(vec![&overlay, &resolved, &globals]);
    let resolver = TemplateResolver::new(store, reference).with_task_scope(&resolved);
    runner.invoke(&task, &resolved, &resolver).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;

    #[test]
    fn test_terminal_states_never_revert() {
        init_test_logging();

        let registry = StateRegistry::new(vec!["a".to_string()]);
        assert!(registry.set_state("a", TaskState::Skipped));
        assert!(!registry.set_state("a", TaskState::Running));
        assert_eq!(registry.state("a"), TaskState::Skipped);
    }

    #[test]
    fn test_cancel_pending_leaves_other_states() {
        init_test_logging();

        let registry = StateRegistry::new(vec!["a".to_string(), "b".to_string()]);
        registry.set_state("a", TaskState::Running);
        let cancelled = registry.cancel_pending();
        assert_eq!(cancelled, vec!["b".to_string()]);
        assert_eq!(registry.state("a"), TaskState::Running);
    }

    #[test]
    fn test_abort_handle_round_trip() {
        let handle = AbortHandle::new();
        assert!(!handle.is_aborted());
        handle.clone().abort();
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_outcome_success_ignores_skipped() {
        let mut tasks = BTreeMap::new();
        let mut ok = TaskOutcome::pending();
        ok.state = TaskState::Succeeded;
        let mut skipped = TaskOutcome::pending();
        skipped.state = TaskState::Skipped;
        tasks.insert("a".to_string(), ok);
        tasks.insert("b".to_string(), skipped);

        let outcome = WorkflowOutcome {
            run_id: Uuid::new_v4(),
            workflow: "w".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tasks,
        };
        assert!(outcome.success());
    }
}
