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

//! # Task Descriptors
//!
//! Immutable descriptions of the work a workflow node performs. The runtime
//! family is a tagged variant — one arm per task kind — so dispatch to a
//! runner is a straight match on the tag rather than string-typed
//! reflection.

use std::fmt;
use std::path::PathBuf;

use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::params::ParamMap;

/// The runtime-specific half of a task descriptor.
///
/// Serialized form carries a `type` tag (`shell`, `python`, `pyspark`,
/// `spark-sql`, `hive-sql`) next to the variant's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
    /// A shell command executed through `sh -c`.
    Shell { command: String },
    /// A local Python script, invoked either with `--key=value` flags or
    /// through a `custom_command` template.
    Python {
        script_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_command: Option<String>,
    },
    /// A PySpark script submitted via `spark-submit`.
    Pyspark {
        script_path: String,
        #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
        spark_config: ParamMap,
    },
    /// SQL executed by the `spark-sql` engine.
    SparkSql {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql_file: Option<String>,
        #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
        spark_config: ParamMap,
        #[serde(
            default,
            alias = "init_script",
            deserialize_with = "one_or_many",
            skip_serializing_if = "Vec::is_empty"
        )]
        init_scripts: Vec<String>,
    },
    /// SQL executed by the `hive` CLI.
    HiveSql {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql_file: Option<String>,
        #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
        hive_config: ParamMap,
        #[serde(
            default,
            alias = "init_script",
            deserialize_with = "one_or_many",
            skip_serializing_if = "Vec::is_empty"
        )]
        init_scripts: Vec<String>,
    },
}

impl TaskKind {
    /// The configuration tag for this kind, as used for runner dispatch.
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Shell { .. } => "shell",
            TaskKind::Python { .. } => "python",
            TaskKind::Pyspark { .. } => "pyspark",
            TaskKind::SparkSql { .. } => "spark-sql",
            TaskKind::HiveSql { .. } => "hive-sql",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete task descriptor: identity, runtime, parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub params: ParamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl TaskSpec {
    pub fn new(task_id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            params: ParamMap::new(),
            working_dir: None,
        }
    }

    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    /// Check per-kind constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.kind {
            TaskKind::Shell { command } if command.trim().is_empty() => {
                Err(ConfigError::MissingTaskField {
                    task: self.task_id.clone(),
                    field: "command",
                })
            }
            TaskKind::SparkSql { sql, sql_file, .. } | TaskKind::HiveSql { sql, sql_file, .. }
                if sql.is_none() && sql_file.is_none() =>
            {
                Err(ConfigError::MissingTaskField {
                    task: self.task_id.clone(),
                    field: "sql (or sql_file)",
                })
            }
            _ => Ok(()),
        }
    }
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    struct OneOrMany;

    impl<'de> Visitor<'de> for OneOrMany {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a list of strings")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(OneOrMany)
}
