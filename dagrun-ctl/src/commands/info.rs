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

use dagrun::WorkflowConfig;
use tracing::error;

use crate::cli::exit;

/// Print workflow metadata: tasks, edges, execution layers and parameters.
pub fn execute(config_path: &Path) -> i32 {
    let config = match WorkflowConfig::from_json_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return exit::CONFIG_INVALID;
        }
    };
    let workflow = match config.build_workflow(None) {
        Ok(workflow) => workflow,
        Err(e) => {
            error!("invalid workflow: {}", e);
            return exit::CONFIG_INVALID;
        }
    };

    println!("Name: {}", workflow.name());
    if let Some(description) = workflow.description() {
        println!("Description: {}", description);
    }

    println!("\nTasks ({}):", workflow.task_count());
    for task_id in workflow.task_ids() {
        let kind = workflow
            .task(&task_id)
            .map(|t| t.kind.name())
            .unwrap_or("unknown");
        println!("  {} ({})", task_id, kind);
    }

    let edges = workflow.edges();
    println!("\nDependencies ({}):", edges.len());
    if edges.is_empty() {
        println!("  none");
    }
    for (from, to) in edges {
        println!("  {} -> {}", from, to);
    }

    match workflow.execution_layers() {
        Ok(layers) => {
            println!("\nExecution layers:");
            for (index, layer) in layers.iter().enumerate() {
                println!("  {} (parallel): {}", index, layer.join(", "));
            }
        }
        Err(e) => {
            error!("invalid workflow: {}", e);
            return exit::CONFIG_INVALID;
        }
    }

    println!("\nGlobal parameters:");
    if workflow.globals().is_empty() {
        println!("  none");
    }
    for (key, value) in workflow.globals().iter() {
        println!("  {} = {}", key, value);
    }

    println!("\nAlerting:");
    match workflow.alert() {
        Some(alert) => {
            println!("  transport: {}", alert.transport);
            println!("  on success: {}", alert.on_success);
            println!("  fail fast: {}", workflow.fail_fast());
        }
        None => println!("  disabled"),
    }

    exit::SUCCESS
}
