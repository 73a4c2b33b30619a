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

//! # Workflow Configuration
//!
//! The JSON document describing a workflow: name, global parameters, task
//! descriptors, dependency edges and an optional alert block. Unknown keys
//! are ignored. Loading a configuration and re-emitting its normalised form
//! is idempotent.
//!
//! Dependency edges accept comma-separated task lists on either side, so
//! `{"from": "a,b", "to": "c"}` expands to the two edges `a->c` and `b->c`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alert::AlertConfig;
use crate::error::ConfigError;
use crate::params::ParamMap;
use crate::task::TaskSpec;
use crate::workflow::Workflow;

/// One `dependencies` entry; both sides may be comma-separated lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub from: String,
    pub to: String,
}

impl DependencyConfig {
    /// Expand into concrete `(from, to)` edges.
    pub fn edges(&self) -> Vec<(String, String)> {
        let split = |raw: &str| -> Vec<String> {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        let mut edges = Vec::new();
        for from in split(&self.from) {
            for to in split(&self.to) {
                edges.push((from.clone(), to.clone()));
            }
        }
        edges
    }
}

/// A parsed workflow configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub params: ParamMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertConfig>,
    /// Failure policy; defaults to true. The alert block's `fail_fast` is
    /// honoured when this is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
}

impl WorkflowConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: WorkflowConfig = serde_json::from_str(&content)?;
        debug!(path = %path.display(), tasks = config.tasks.len(), "loaded workflow configuration");
        Ok(config)
    }

    /// Build a configuration from an in-memory JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Emit the normalised form of this configuration.
    pub fn to_value(&self) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task_id.clone()).collect()
    }

    /// Materialise a [`Workflow`] from this configuration.
    ///
    /// `overrides` merge into the workflow-global parameter scope at build
    /// time. This is the right path for consumers that never invoke the
    /// engine — `visualize` and embedders inspecting a parameterised
    /// workflow. Execution paths (`run`, `backfill`) deliberately pass
    /// `None` here and hand their overlay to
    /// [`Engine::run`](crate::engine::Engine::run) instead: the engine keeps
    /// it as the highest-precedence runtime scope, resolved just before each
    /// task is dispatched, which is what lets backfill-supplied values reach
    /// per-task parameter templates.
    pub fn build_workflow(&self, overrides: Option<&ParamMap>) -> Result<Workflow, ConfigError> {
        let mut workflow = Workflow::new(&self.name);
        if let Some(description) = &self.description {
            workflow.set_description(description);
        }

        workflow.set_params(&self.params);
        if let Some(overrides) = overrides {
            workflow.set_params(overrides);
        }

        for task in &self.tasks {
            task.validate()?;
            workflow.add_task(task.clone())?;
        }
        for dependency in &self.dependencies {
            for (from, to) in dependency.edges() {
                workflow.add_dependency(&from, &to)?;
            }
        }

        match (self.fail_fast, &self.alert) {
            (Some(fail_fast), _) => workflow.set_fail_fast(fail_fast),
            (None, Some(alert)) => workflow.set_fail_fast(alert.fail_fast),
            (None, None) => {}
        }
        if let Some(alert) = &self.alert {
            workflow.set_alert(alert.clone());
        }

        workflow.validate()?;
        Ok(workflow)
    }
}

/// Load a runtime parameter overlay (a flat JSON object) from a file.
pub fn load_overlay(path: impl AsRef<Path>) -> Result<ParamMap, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
