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

//! Error types for the dagrun engine.
//!
//! Each concern gets its own enum: configuration loading, structural
//! validation, task execution, engine orchestration, and alert delivery.
//! Alert delivery errors are logged by the emitter and never reach callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::runner::TaskOutput;

/// Errors raised while loading or interpreting configuration documents.
///
/// All of these are fatal before any task runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task '{task}' is missing required field '{field}'")]
    MissingTaskField { task: String, field: &'static str },

    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("invalid backfill specification: {0}")]
    InvalidBackfill(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors raised while validating workflow structure.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("workflow contains no tasks")]
    EmptyWorkflow,

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("dependency edge references unknown task '{task}'")]
    UnknownEdgeTask { task: String },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("unknown task id: {0}")]
    UnknownTask(String),
}

/// Errors produced by task runners.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("command exited with status {}", .output.exit_code)]
    NonZeroExit { output: TaskOutput },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("init script not found: {0}")]
    MissingInitScript(PathBuf),

    #[error("no runner registered for task type '{0}'")]
    NoRunner(String),
}

/// Errors raised by the execution engine itself.
///
/// Individual task failures are not engine errors; they are recorded in the
/// [`WorkflowOutcome`](crate::engine::WorkflowOutcome) and surfaced through
/// the aggregate success flag.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("task dispatch failed: {0}")]
    Dispatch(#[from] tokio::sync::AcquireError),
}

/// Errors raised while delivering alerts. Never affects workflow state.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("failed to deliver alert: {0}")]
    Transport(#[from] reqwest::Error),
}
