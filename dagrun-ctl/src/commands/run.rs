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

use std::path::Path;

use dagrun::{load_overlay, Engine, EngineError, ParamMap, RunOptions, WorkflowConfig};
use tracing::{error, info};

use crate::cli::exit;
use crate::commands::selection;
use crate::output::print_summary;

/// Execute a workflow once. Returns the process exit code.
pub async fn execute(
    config_path: &Path,
    params_path: Option<&Path>,
    job_ids: Option<&str>,
    start_from: Option<String>,
) -> i32 {
    let config = match WorkflowConfig::from_json_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return exit::CONFIG_INVALID;
        }
    };

    let overlay = match params_path {
        None => ParamMap::new(),
        Some(path) => match load_overlay(path) {
            Ok(overlay) => overlay,
            Err(e) => {
                error!("invalid parameter overlay: {}", e);
                return exit::CONFIG_INVALID;
            }
        },
    };

    let workflow = match config.build_workflow(None) {
        Ok(workflow) => workflow,
        Err(e) => {
            error!("invalid workflow: {}", e);
            return exit::CONFIG_INVALID;
        }
    };

    let (only_tasks, start_from) = selection(job_ids, start_from);
    match &only_tasks {
        Some(ids) => info!("executing only: {}", ids.join(", ")),
        None => match &start_from {
            Some(task) => info!("executing '{}' and its downstream tasks", task),
            None => info!("executing all {} tasks", workflow.task_count()),
        },
    }

    let options = RunOptions {
        only_tasks,
        start_from,
        ..RunOptions::default()
    };
    let engine = Engine::new();
    match engine.run(&workflow, &overlay, &options).await {
        Ok(outcome) => {
            print_summary(&outcome);
            if outcome.success() {
                exit::SUCCESS
            } else {
                exit::TASK_FAILED
            }
        }
        Err(EngineError::Validation(e)) => {
            error!("invalid workflow: {}", e);
            exit::CONFIG_INVALID
        }
        Err(e) => {
            error!("internal error: {}", e);
            exit::INTERNAL
        }
    }
}
