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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dagrun-ctl",
    version,
    about = "Command-line interface for running and inspecting dagrun workflows",
    long_about = "A tool for executing, backfilling, visualizing and inspecting configuration-driven workflow DAGs"
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow once
    Run {
        /// Path to the workflow configuration file
        #[arg(long)]
        config: PathBuf,

        /// Path to a runtime parameter overlay file
        #[arg(long)]
        params: Option<PathBuf>,

        /// Comma-separated task IDs to execute; everything else is skipped
        #[arg(long = "job_ids")]
        job_ids: Option<String>,

        /// Execute this task and all of its downstream tasks
        #[arg(long = "start_from")]
        start_from: Option<String>,
    },
    /// Execute a workflow over a backfill date plan
    Backfill {
        /// Path to the workflow configuration file
        #[arg(long)]
        config: PathBuf,

        /// Path to the backfill specification file
        #[arg(long = "backfill_params")]
        backfill_params: PathBuf,

        /// Comma-separated task IDs to execute; everything else is skipped
        #[arg(long = "job_ids")]
        job_ids: Option<String>,

        /// Execute this task and all of its downstream tasks
        #[arg(long = "start_from")]
        start_from: Option<String>,

        /// Confirm the backfill plan without prompting
        #[arg(long = "auto_confirm")]
        auto_confirm: bool,
    },
    /// Render the workflow DAG
    Visualize {
        /// Path to the workflow configuration file
        #[arg(long)]
        config: PathBuf,

        /// Write the rendering to this path instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format (dot, ascii)
        #[arg(long, default_value = "dot")]
        format: String,

        /// Path to a runtime parameter overlay file
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Print workflow metadata: tasks, edges, layers, parameters
    Info {
        /// Path to the workflow configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

/// Process exit codes shared by every subcommand.
pub mod exit {
    /// All non-skipped tasks succeeded.
    pub const SUCCESS: i32 = 0;
    /// At least one task failed.
    pub const TASK_FAILED: i32 = 1;
    /// The configuration was invalid.
    pub const CONFIG_INVALID: i32 = 2;
    /// An internal error occurred.
    pub const INTERNAL: i32 = 3;
}
