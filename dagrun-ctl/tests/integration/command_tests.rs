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

//! Exit-code behavior of the subcommand entry points, driven through real
//! configuration files on disk.

use std::io::Write;
use std::path::PathBuf;

use dagrun_ctl::cli::exit;
use dagrun_ctl::commands;

fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

const LINEAR: &str = r#"{
    "name": "linear",
    "tasks": [
        {"task_id": "a", "type": "shell", "command": "echo a"},
        {"task_id": "b", "type": "shell", "command": "echo b"}
    ],
    "dependencies": [{"from": "a", "to": "b"}]
}"#;

const FAILING: &str = r#"{
    "name": "failing",
    "tasks": [
        {"task_id": "a", "type": "shell", "command": "exit 7"},
        {"task_id": "b", "type": "shell", "command": "echo b"}
    ],
    "dependencies": [{"from": "a", "to": "b"}]
}"#;

const CYCLIC: &str = r#"{
    "name": "cyclic",
    "tasks": [
        {"task_id": "a", "type": "shell", "command": "echo a"},
        {"task_id": "b", "type": "shell", "command": "echo b"}
    ],
    "dependencies": [
        {"from": "a", "to": "b"},
        {"from": "b", "to": "a"}
    ]
}"#;

#[tokio::test]
async fn run_returns_zero_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);

    let code = commands::run::execute(&config, None, None, None).await;
    assert_eq!(code, exit::SUCCESS);
}

#[tokio::test]
async fn run_returns_one_when_a_task_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", FAILING);

    let code = commands::run::execute(&config, None, None, None).await;
    assert_eq!(code, exit::TASK_FAILED);
}

#[tokio::test]
async fn run_rejects_cyclic_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", CYCLIC);

    let code = commands::run::execute(&config, None, None, None).await;
    assert_eq!(code, exit::CONFIG_INVALID);
}

#[tokio::test]
async fn run_rejects_missing_file() {
    let code =
        commands::run::execute(&PathBuf::from("/nonexistent/workflow.json"), None, None, None)
            .await;
    assert_eq!(code, exit::CONFIG_INVALID);
}

#[tokio::test]
async fn run_with_job_ids_skips_other_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", FAILING);

    // Only run "b": the failing task "a" is skipped, so the run succeeds.
    let code = commands::run::execute(&config, None, Some("b"), None).await;
    assert_eq!(code, exit::SUCCESS);
}

#[tokio::test]
async fn backfill_dry_run_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", FAILING);
    let backfill = write_config(
        &dir,
        "backfill.json",
        r#"{"custom_dates": ["2024-05-01", "2024-05-02"], "dry_run": true}"#,
    );

    // Even though the workflow would fail, a dry run only prints overlays.
    let code = commands::backfill::execute(&config, &backfill, None, None, true).await;
    assert_eq!(code, exit::SUCCESS);
}

#[tokio::test]
async fn backfill_runs_every_date_point() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);
    let backfill = write_config(
        &dir,
        "backfill.json",
        r#"{"start_date": "2024-05-01", "end_date": "2024-05-03"}"#,
    );

    let code = commands::backfill::execute(&config, &backfill, None, None, true).await;
    assert_eq!(code, exit::SUCCESS);
}

#[tokio::test]
async fn backfill_reports_failed_date_points() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", FAILING);
    let backfill = write_config(
        &dir,
        "backfill.json",
        r#"{"custom_dates": ["2024-05-01"]}"#,
    );

    let code = commands::backfill::execute(&config, &backfill, None, None, true).await;
    assert_eq!(code, exit::TASK_FAILED);
}

#[tokio::test]
async fn backfill_rejects_invalid_spec() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);
    let backfill = write_config(&dir, "backfill.json", r#"{"date_granularity": "day"}"#);

    let code = commands::backfill::execute(&config, &backfill, None, None, true).await;
    assert_eq!(code, exit::CONFIG_INVALID);
}

#[test]
fn visualize_writes_dot_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);
    let output = dir.path().join("graph.dot");

    let code = commands::visualize::execute(&config, Some(output.as_path()), "dot", None);
    assert_eq!(code, exit::SUCCESS);

    let rendered = std::fs::read_to_string(&output).unwrap();
    assert!(rendered.contains("digraph \"linear\""));
    assert!(rendered.contains("\"a\" -> \"b\";"));
}

#[test]
fn visualize_rejects_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);

    let code = commands::visualize::execute(&config, None, "png", None);
    assert_eq!(code, exit::CONFIG_INVALID);
}

#[test]
fn info_prints_for_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", LINEAR);

    let code = commands::info::execute(&config);
    assert_eq!(code, exit::SUCCESS);
}

#[test]
fn info_rejects_cyclic_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "workflow.json", CYCLIC);

    let code = commands::info::execute(&config);
    assert_eq!(code, exit::CONFIG_INVALID);
}
