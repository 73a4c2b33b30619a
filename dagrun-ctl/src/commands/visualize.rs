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

use dagrun::{load_overlay, WorkflowConfig};
use tracing::{error, info};

use crate::cli::exit;
use crate::visualization::{render_ascii, render_dot};

/// Render the workflow DAG as DOT or ASCII, to stdout or a file.
pub fn execute(
    config_path: &Path,
    output_path: Option<&Path>,
    format: &str,
    params_path: Option<&Path>,
) -> i32 {
    let config = match WorkflowConfig::from_json_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return exit::CONFIG_INVALID;
        }
    };
    let overlay = match params_path {
        None => None,
        Some(path) => match load_overlay(path) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                error!("invalid parameter overlay: {}", e);
                return exit::CONFIG_INVALID;
            }
        },
    };
    let workflow = match config.build_workflow(overlay.as_ref()) {
        Ok(workflow) => workflow,
        Err(e) => {
            error!("invalid workflow: {}", e);
            return exit::CONFIG_INVALID;
        }
    };

    let rendering = match format {
        "dot" => render_dot(&workflow),
        "ascii" => match render_ascii(&workflow) {
            Ok(rendering) => rendering,
            Err(e) => {
                error!("invalid workflow: {}", e);
                return exit::CONFIG_INVALID;
            }
        },
        other => {
            error!("unsupported format '{}': use 'dot' or 'ascii'", other);
            return exit::CONFIG_INVALID;
        }
    };

    match output_path {
        None => {
            print!("{}", rendering);
            exit::SUCCESS
        }
        Some(path) => match std::fs::write(path, rendering) {
            Ok(()) => {
                info!("workflow rendering written to {}", path.display());
                exit::SUCCESS
            }
            Err(e) => {
                error!("failed to write {}: {}", path.display(), e);
                exit::INTERNAL
            }
        },
    }
}
