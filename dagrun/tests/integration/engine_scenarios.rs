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

//! End-to-end scheduling scenarios driven through a scripted runner.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dagrun::{
    Engine, ParamMap, RunOptions, RunnerRegistry, TaskError, TaskKind, TaskOutput, TaskRunner,
    TaskSpec, TaskState, TemplateResolver, Workflow,
};

/// A runner that succeeds or fails on cue and records every resolved
/// shell command it would have executed.
#[derive(Default)]
struct ScriptedRunner {
    fail: HashSet<String>,
    commands: Arc<Mutex<HashMap<String, String>>>,
}

impl ScriptedRunner {
    fn failing<const N: usize>(ids: [&str; N]) -> Self {
        Self {
            fail: ids.iter().map(|s| s.to_string()).collect(),
            commands: Arc::default(),
        }
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        _params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        if let TaskKind::Shell { command } = &task.kind {
            self.commands
                .lock()
                .unwrap()
                .insert(task.task_id.clone(), resolver.resolve(command));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let output = TaskOutput {
            exit_code: if self.fail.contains(&task.task_id) { 1 } else { 0 },
            stdout: format!("ran {}", task.task_id),
            stderr: String::new(),
            duration: Duration::from_millis(5),
        };
        if self.fail.contains(&task.task_id) {
            Err(TaskError::NonZeroExit { output })
        } else {
            Ok(output)
        }
    }
}

fn engine_with(runner: ScriptedRunner) -> (Engine, Arc<Mutex<HashMap<String, String>>>) {
    let commands = runner.commands.clone();
    let mut registry = RunnerRegistry::new();
    registry.register("shell", Arc::new(runner));
    (Engine::new().with_runners(Arc::new(registry)), commands)
}

fn shell_task(id: &str) -> TaskSpec {
    TaskSpec::new(
        id,
        TaskKind::Shell {
            command: format!("echo {}", id),
        },
    )
}

/// A -> B, A -> C, B -> D, C -> D.
fn diamond(fail_fast: bool) -> Workflow {
    let mut workflow = Workflow::new("diamond");
    for id in ["a", "b", "c", "d"] {
        workflow.add_task(shell_task(id)).unwrap();
    }
    workflow.add_dependency("a", "b").unwrap();
    workflow.add_dependency("a", "c").unwrap();
    workflow.add_dependency("b", "d").unwrap();
    workflow.add_dependency("c", "d").unwrap();
    workflow.set_fail_fast(fail_fast);
    workflow
}

#[tokio::test]
async fn linear_chain_succeeds_in_order() {
    let workflow = Workflow::builder("linear")
        .add_task(shell_task("a"))
        .unwrap()
        .add_task(shell_task("b"))
        .unwrap()
        .add_task(shell_task("c"))
        .unwrap()
        .dependency("a", "b")
        .unwrap()
        .dependency("b", "c")
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::default());
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(outcome.success());
    for id in ["a", "b", "c"] {
        assert_eq!(outcome.tasks[id].state, TaskState::Succeeded);
    }

    // Per-edge ordering: an upstream task terminates before its dependent starts.
    for (up, down) in [("a", "b"), ("b", "c")] {
        let finished = outcome.tasks[up].finished_at.unwrap();
        let started = outcome.tasks[down].started_at.unwrap();
        assert!(finished <= started, "{} must finish before {} starts", up, down);
    }
}

#[tokio::test]
async fn fail_fast_cancels_descendants_and_siblings() {
    let workflow = diamond(true);
    let (engine, _) = engine_with(ScriptedRunner::failing(["a"]));
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.tasks["a"].state, TaskState::Failed);
    for id in ["b", "c", "d"] {
        assert_eq!(outcome.tasks[id].state, TaskState::Cancelled, "task {}", id);
    }
}

#[tokio::test]
async fn non_fail_fast_runs_unaffected_branches() {
    let workflow = diamond(false);
    let (engine, _) = engine_with(ScriptedRunner::failing(["b"]));
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.tasks["a"].state, TaskState::Succeeded);
    assert_eq!(outcome.tasks["b"].state, TaskState::Failed);
    assert_eq!(outcome.tasks["c"].state, TaskState::Succeeded);
    // d has a failed predecessor, so it is cancelled rather than run.
    assert_eq!(outcome.tasks["d"].state, TaskState::Cancelled);
}

#[tokio::test]
async fn templates_resolve_through_scopes_before_dispatch() {
    let mut workflow = Workflow::new("templated");
    let mut task = shell_task("greet");
    task.kind = TaskKind::Shell {
        command: "echo ${msg}".to_string(),
    };
    let params: ParamMap = [("msg", "hello ${region}")].into_iter().collect();
    task.params = params;
    workflow.add_task(task).unwrap();
    workflow.set_param("region", "us");

    let (engine, commands) = engine_with(ScriptedRunner::default());
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(outcome.success());
    assert_eq!(
        commands.lock().unwrap().get("greet").map(String::as_str),
        Some("echo hello us")
    );
}

#[tokio::test]
async fn ref_date_override_drives_date_expressions() {
    let mut workflow = Workflow::new("dated");
    let mut task = shell_task("stamp");
    task.kind = TaskKind::Shell {
        command: "dt=${yyyyMMdd-1}".to_string(),
    };
    workflow.add_task(task).unwrap();

    let overlay: ParamMap = [("ref_date", "2024-03-01")].into_iter().collect();
    let (engine, commands) = engine_with(ScriptedRunner::default());
    engine
        .run(&workflow, &overlay, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        commands.lock().unwrap().get("stamp").map(String::as_str),
        Some("dt=20240229")
    );
}

#[tokio::test]
async fn only_tasks_filter_skips_everything_else() {
    let workflow = Workflow::builder("filtered")
        .add_task(shell_task("a"))
        .unwrap()
        .add_task(shell_task("b"))
        .unwrap()
        .add_task(shell_task("c"))
        .unwrap()
        .dependency("a", "b")
        .unwrap()
        .dependency("b", "c")
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::default());
    let options = RunOptions {
        only_tasks: Some(vec!["b".to_string()]),
        ..RunOptions::default()
    };
    let outcome = engine.run(&workflow, &ParamMap::new(), &options).await.unwrap();

    // b runs even though its upstream is excluded; a and c are skipped.
    assert_eq!(outcome.tasks["a"].state, TaskState::Skipped);
    assert_eq!(outcome.tasks["b"].state, TaskState::Succeeded);
    assert_eq!(outcome.tasks["c"].state, TaskState::Skipped);
    assert!(outcome.success());

    // Everything that actually executed is a member of the filter.
    let only: HashSet<&str> = ["b"].into();
    for (id, task) in &outcome.tasks {
        if matches!(task.state, TaskState::Succeeded | TaskState::Failed) {
            assert!(only.contains(id.as_str()));
        }
    }
}

#[tokio::test]
async fn unknown_only_task_is_rejected() {
    let workflow = Workflow::builder("w")
        .add_task(shell_task("a"))
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::default());
    let options = RunOptions {
        only_tasks: Some(vec!["ghost".to_string()]),
        ..RunOptions::default()
    };
    assert!(engine.run(&workflow, &ParamMap::new(), &options).await.is_err());
}

#[tokio::test]
async fn start_from_selects_downstream_closure() {
    let workflow = Workflow::builder("partial")
        .add_task(shell_task("a"))
        .unwrap()
        .add_task(shell_task("b"))
        .unwrap()
        .add_task(shell_task("c"))
        .unwrap()
        .dependency("a", "b")
        .unwrap()
        .dependency("b", "c")
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::default());
    let options = RunOptions {
        start_from: Some("b".to_string()),
        ..RunOptions::default()
    };
    let outcome = engine.run(&workflow, &ParamMap::new(), &options).await.unwrap();

    assert_eq!(outcome.tasks["a"].state, TaskState::Skipped);
    assert_eq!(outcome.tasks["b"].state, TaskState::Succeeded);
    assert_eq!(outcome.tasks["c"].state, TaskState::Succeeded);
}

#[tokio::test]
async fn aborted_run_cancels_pending_tasks() {
    let workflow = Workflow::builder("aborted")
        .add_task(shell_task("a"))
        .unwrap()
        .add_task(shell_task("b"))
        .unwrap()
        .dependency("a", "b")
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::default());
    engine.abort_handle().abort();
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.tasks["a"].state, TaskState::Cancelled);
    assert_eq!(outcome.tasks["b"].state, TaskState::Cancelled);
}

#[tokio::test]
async fn failure_log_is_recorded_in_outcome() {
    let workflow = Workflow::builder("logged")
        .add_task(shell_task("a"))
        .unwrap()
        .build()
        .unwrap();

    let (engine, _) = engine_with(ScriptedRunner::failing(["a"]));
    let outcome = engine
        .run(&workflow, &ParamMap::new(), &RunOptions::default())
        .await
        .unwrap();

    let task = &outcome.tasks["a"];
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.exit_code, Some(1));
    assert!(task.error.as_deref().unwrap().contains("status 1"));
    assert!(task.duration().is_some());
}
