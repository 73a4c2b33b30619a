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

//! # Task Runners
//!
//! The contract by which the engine invokes a task, plus one runner per
//! task kind. A runner receives the task descriptor, its fully resolved
//! parameter map and a template resolver for expanding command strings and
//! SQL bodies; it returns the captured outcome of the external process.
//!
//! Argument conventions:
//!
//! - script runners (`python`, `pyspark`) pass parameters as `--key=value`
//!   flags in the insertion order of the task's parameter map;
//! - SQL runners materialise the resolved SQL text into a temp file handed
//!   to the engine via `-f`, pass the engine config map as `--conf` /
//!   `--hiveconf` pairs and parameters as `--hivevar` pairs;
//! - a `custom_command` template, when present, is resolved with an extended
//!   scope exposing `script_path` and `params.<name>` and executed verbatim.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TaskError;
use crate::params::{ParamMap, TemplateResolver};
use crate::task::{TaskKind, TaskSpec};

/// Upper bound on captured output per stream; the tail is kept.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// The captured outcome of one task invocation.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Contract between the execution engine and a task runtime.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn invoke(
        &self,
        task: &TaskSpec,
        params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError>;
}

/// Dispatch table mapping a task kind tag to its runner.
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn TaskRunner>>,
}

impl RunnerRegistry {
    /// An empty registry; useful for tests installing mock runners.
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// A registry with the built-in runner for every task kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("shell", Arc::new(ShellRunner));
        registry.register("python", Arc::new(PythonRunner));
        registry.register("pyspark", Arc::new(PysparkRunner));
        registry.register("spark-sql", Arc::new(SparkSqlRunner));
        registry.register("hive-sql", Arc::new(HiveSqlRunner));
        registry
    }

    pub fn register(&mut self, kind: &str, runner: Arc<dyn TaskRunner>) {
        self.runners.insert(kind.to_string(), runner);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskRunner>> {
        self.runners.get(kind).cloned()
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Runs resolved shell commands through `sh -c`.
pub struct ShellRunner;

#[async_trait]
impl TaskRunner for ShellRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        _params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let TaskKind::Shell { command } = &task.kind else {
            return Err(TaskError::NoRunner(task.kind.name().to_string()));
        };
        let resolved = resolver.resolve(command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&resolved);
        apply_working_dir(&mut cmd, task.working_dir.as_deref());
        run_process(cmd, &resolved, &task.task_id).await
    }
}

/// Runs local Python scripts, honouring `custom_command` templates.
pub struct PythonRunner;

#[async_trait]
impl TaskRunner for PythonRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let TaskKind::Python {
            script_path,
            custom_command,
        } = &task.kind
        else {
            return Err(TaskError::NoRunner(task.kind.name().to_string()));
        };
        let script = resolve_path(script_path, task.working_dir.as_deref());

        if let Some(template) = custom_command {
            let extra: ParamMap = [("script_path", script.to_string_lossy().as_ref())]
                .into_iter()
                .collect();
            let resolved = resolver.resolve_with_extra(template, &extra);

            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&resolved);
            apply_working_dir(&mut cmd, task.working_dir.as_deref());
            return run_process(cmd, &resolved, &task.task_id).await;
        }

        let mut cmd = Command::new("python");
        cmd.arg(&script);
        cmd.args(flag_args(params));
        apply_working_dir(&mut cmd, task.working_dir.as_deref());
        let command_display = format!("python {}", script.display());
        run_process(cmd, &command_display, &task.task_id).await
    }
}

/// Submits PySpark scripts via `spark-submit`.
pub struct PysparkRunner;

#[async_trait]
impl TaskRunner for PysparkRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let TaskKind::Pyspark {
            script_path,
            spark_config,
        } = &task.kind
        else {
            return Err(TaskError::NoRunner(task.kind.name().to_string()));
        };
        let script = resolve_path(script_path, task.working_dir.as_deref());

        let mut cmd = Command::new("spark-submit");
        cmd.args(conf_args("--conf", spark_config, resolver));
        cmd.arg(&script);
        cmd.args(flag_args(params));
        apply_working_dir(&mut cmd, task.working_dir.as_deref());
        let command_display = format!("spark-submit {}", script.display());
        run_process(cmd, &command_display, &task.task_id).await
    }
}

/// Executes resolved SQL through the `spark-sql` engine.
pub struct SparkSqlRunner;

#[async_trait]
impl TaskRunner for SparkSqlRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let TaskKind::SparkSql {
            sql,
            sql_file,
            spark_config,
            init_scripts,
        } = &task.kind
        else {
            return Err(TaskError::NoRunner(task.kind.name().to_string()));
        };

        let sql_temp = materialize_sql(sql, sql_file, task.working_dir.as_deref(), resolver)?;

        let mut config = spark_config.clone();
        // spark-sql only expands hivevars in -i scripts when substitution is on.
        if !init_scripts.is_empty() && !config.contains_key("spark.sql.variable.substitution") {
            config.insert("spark.sql.variable.substitution", "true");
        }

        let mut cmd = Command::new("spark-sql");
        cmd.args(init_args(init_scripts, task.working_dir.as_deref())?);
        cmd.args(conf_args("--conf", &config, resolver));
        cmd.arg("-f").arg(sql_temp.path());
        cmd.args(var_args(params));
        apply_working_dir(&mut cmd, task.working_dir.as_deref());
        run_process(cmd, "spark-sql", &task.task_id).await
    }
}

/// Executes resolved SQL through the `hive` CLI.
pub struct HiveSqlRunner;

#[async_trait]
impl TaskRunner for HiveSqlRunner {
    async fn invoke(
        &self,
        task: &TaskSpec,
        params: &ParamMap,
        resolver: &TemplateResolver<'_>,
    ) -> Result<TaskOutput, TaskError> {
        let TaskKind::HiveSql {
            sql,
            sql_file,
            hive_config,
            init_scripts,
        } = &task.kind
        else {
            return Err(TaskError::NoRunner(task.kind.name().to_string()));
        };

        let sql_temp = materialize_sql(sql, sql_file, task.working_dir.as_deref(), resolver)?;

        let mut cmd = Command::new("hive");
        cmd.args(init_args(init_scripts, task.working_dir.as_deref())?);
        cmd.args(conf_args("--hiveconf", hive_config, resolver));
        cmd.arg("-f").arg(sql_temp.path());
        cmd.args(var_args(params));
        apply_working_dir(&mut cmd, task.working_dir.as_deref());
        run_process(cmd, "hive", &task.task_id).await
    }
}

/// `--key=value` flags in the insertion order of the parameter map.
fn flag_args(params: &ParamMap) -> Vec<String> {
    params
        .iter()
        .map(|(k, v)| format!("--{}={}", k, v))
        .collect()
}

/// `--hivevar key=value` pairs for SQL engines.
fn var_args(params: &ParamMap) -> Vec<String> {
    params
        .iter()
        .flat_map(|(k, v)| ["--hivevar".to_string(), format!("{}={}", k, v)])
        .collect()
}

/// Engine config pairs (`--conf k=v` / `--hiveconf k=v`), with template
/// expansion applied to the values.
fn conf_args(flag: &str, config: &ParamMap, resolver: &TemplateResolver<'_>) -> Vec<String> {
    config
        .iter()
        .flat_map(|(k, v)| [flag.to_string(), format!("{}={}", k, resolver.resolve(v))])
        .collect()
}

/// `-i <script>` pairs, verifying each init script exists.
fn init_args(init_scripts: &[String], working_dir: Option<&Path>) -> Result<Vec<String>, TaskError> {
    let mut args = Vec::new();
    for script in init_scripts {
        let path = resolve_path(script, working_dir);
        if !path.exists() {
            return Err(TaskError::MissingInitScript(path));
        }
        args.push("-i".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    Ok(args)
}

/// Write the resolved SQL text to a temp file handed to the engine.
fn materialize_sql(
    sql: &Option<String>,
    sql_file: &Option<String>,
    working_dir: Option<&Path>,
    resolver: &TemplateResolver<'_>,
) -> Result<tempfile::NamedTempFile, TaskError> {
    let text = match (sql, sql_file) {
        (Some(text), _) => text.clone(),
        (None, Some(file)) => {
            let path = resolve_path(file, working_dir);
            std::fs::read_to_string(&path).map_err(|source| TaskError::Io { path, source })?
        }
        (None, None) => String::new(),
    };
    let resolved = resolver.resolve(&text);
    debug!(sql = resolved.as_str(), "materialized SQL body");

    let mut file = tempfile::Builder::new()
        .suffix(".sql")
        .tempfile()
        .map_err(|source| TaskError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
    file.write_all(resolved.as_bytes())
        .map_err(|source| TaskError::Io {
            path: file.path().to_path_buf(),
            source,
        })?;
    Ok(file)
}

fn resolve_path(path: &str, working_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(path);
    match working_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn apply_working_dir(cmd: &mut Command, working_dir: Option<&Path>) {
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
}

/// Spawn the prepared command, capture its output and map non-zero exits.
async fn run_process(
    mut command: Command,
    command_display: &str,
    task_id: &str,
) -> Result<TaskOutput, TaskError> {
    info!(task = task_id, command = %command_display, "executing task command");

    let started = Instant::now();
    let output = command
        .output()
        .await
        .map_err(|source| TaskError::Spawn {
            command: command_display.to_string(),
            source,
        })?;

    let result = TaskOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: truncate_capture(&output.stdout),
        stderr: truncate_capture(&output.stderr),
        duration: started.elapsed(),
    };

    if output.status.success() {
        Ok(result)
    } else {
        Err(TaskError::NonZeroExit { output: result })
    }
}

/// Keep the tail of a captured stream within [`MAX_CAPTURE_BYTES`].
fn truncate_capture(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_CAPTURE_BYTES {
        return text.into_owned();
    }
    let mut idx = text.len() - MAX_CAPTURE_BYTES;
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    format!("... ({} bytes truncated)\n{}", idx, &text[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;
    use crate::params::ParamStore;
    use chrono::NaiveDate;

    fn reference() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_flag_args_preserve_insertion_order() {
        let params: ParamMap = [("day_id", "2024-07-15"), ("table", "events")]
            .into_iter()
            .collect();
        assert_eq!(
            flag_args(&params),
            vec!["--day_id=2024-07-15", "--table=events"]
        );
    }

    #[test]
    fn test_var_args_shape() {
        let params: ParamMap = [("day_id", "2024-07-15")].into_iter().collect();
        assert_eq!(var_args(&params), vec!["--hivevar", "day_id=2024-07-15"]);
    }

    #[test]
    fn test_conf_args_resolve_templates() {
        init_test_logging();

        let globals: ParamMap = [("queue", "etl")].into_iter().collect();
        let store = ParamStore::layered(vec![&globals]);
        let resolver = TemplateResolver::new(store, reference());

        let config: ParamMap = [("spark.yarn.queue", "${queue}")].into_iter().collect();
        assert_eq!(
            conf_args("--conf", &config, &resolver),
            vec!["--conf", "spark.yarn.queue=etl"]
        );
    }

    #[test]
    fn test_truncate_capture_keeps_tail() {
        let big = "x".repeat(MAX_CAPTURE_BYTES + 10);
        let truncated = truncate_capture(big.as_bytes());
        assert!(truncated.starts_with("..."));
        assert!(truncated.len() < big.len() + 64);
    }

    #[tokio::test]
    async fn test_shell_runner_captures_output() {
        init_test_logging();

        let globals: ParamMap = [("who", "world")].into_iter().collect();
        let store = ParamStore::layered(vec![&globals]);
        let resolver = TemplateResolver::new(store, reference());

        let task = TaskSpec::new(
            "greet",
            TaskKind::Shell {
                command: "echo hello ${who}".to_string(),
            },
        );
        let output = ShellRunner
            .invoke(&task, &ParamMap::new(), &resolver)
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_shell_runner_nonzero_exit() {
        init_test_logging();

        let resolver = TemplateResolver::new(ParamStore::new(), reference());
        let task = TaskSpec::new(
            "boom",
            TaskKind::Shell {
                command: "echo oops >&2; exit 3".to_string(),
            },
        );
        let err = ShellRunner
            .invoke(&task, &ParamMap::new(), &resolver)
            .await
            .unwrap_err();

        match err {
            TaskError::NonZeroExit { output } => {
                assert_eq!(output.exit_code, 3);
                assert_eq!(output.stderr.trim(), "oops");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_covers_every_kind() {
        let registry = RunnerRegistry::with_defaults();
        for kind in ["shell", "python", "pyspark", "spark-sql", "hive-sql"] {
            assert!(registry.get(kind).is_some(), "missing runner for {}", kind);
        }
    }
}
