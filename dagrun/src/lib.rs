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

//! # Dagrun
//!
//! A configuration-driven workflow scheduler for data-engineering pipelines.
//! A workflow is a directed acyclic graph of heterogeneous tasks — shell
//! commands, local scripts, SQL handed to external engines — with typed
//! dependencies, layered parameters and optional alerting.
//!
//! ## Core Components
//!
//! - [`workflow::Workflow`]: the DAG model with validation and layering
//! - [`engine::Engine`]: layer-parallel execution with fail-fast semantics
//! - [`params`]: scoped parameters and `${...}` template resolution
//! - [`dates`] / [`backfill`]: date expressions and backfill expansion
//! - [`runner`]: the task runner contract and built-in runtimes
//! - [`alert`]: structured alert events with webhook delivery
//! - [`config`]: the JSON configuration model
//!
//! ## Example
//!
//! ```no_run
//! use dagrun::{Engine, ParamMap, RunOptions, TaskKind, TaskSpec, Workflow};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = Workflow::builder("daily-etl")
//!     .param("region", "us")
//!     .add_task(TaskSpec::new(
//!         "extract",
//!         TaskKind::Shell {
//!             command: "echo extracting ${region}".to_string(),
//!         },
//!     ))?
//!     .add_task(TaskSpec::new(
//!         "load",
//!         TaskKind::Shell {
//!             command: "echo loading".to_string(),
//!         },
//!     ))?
//!     .dependency("extract", "load")?
//!     .build()?;
//!
//! let engine = Engine::new();
//! let outcome = engine
//!     .run(&workflow, &ParamMap::new(), &RunOptions::default())
//!     .await?;
//! assert!(outcome.success());
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod backfill;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod params;
pub mod runner;
pub mod task;
pub mod workflow;

pub use alert::{AlertConfig, AlertEmitter, AlertEvent, AlertTransport};
pub use backfill::{BackfillPlan, BackfillSpec, DatePoint, Granularity};
pub use config::{load_overlay, DependencyConfig, WorkflowConfig};
pub use engine::{
    AbortHandle, Engine, EngineConfig, RunOptions, TaskOutcome, TaskState, WorkflowOutcome,
};
pub use error::{AlertError, ConfigError, EngineError, TaskError, ValidationError};
pub use params::{ParamMap, ParamStore, TemplateResolver};
pub use runner::{RunnerRegistry, TaskOutput, TaskRunner};
pub use task::{TaskKind, TaskSpec};
pub use workflow::{DependencyGraph, Workflow, WorkflowBuilder};

/// Initialise tracing output for tests; safe to call repeatedly.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
