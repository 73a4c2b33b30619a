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

use std::fmt::Write;

use dagrun::{ValidationError, Workflow};

/// Render the workflow as an ASCII layer listing.
///
/// Tasks in one layer may run in parallel; each task line also names its
/// direct upstream dependencies.
pub fn render_ascii(workflow: &Workflow) -> Result<String, ValidationError> {
    let layers = workflow.execution_layers()?;
    let mut out = String::new();

    let _ = writeln!(out, "{}", workflow.name());
    if let Some(description) = workflow.description() {
        let _ = writeln!(out, "{}", description);
    }
    let _ = writeln!(out);

    for (index, layer) in layers.iter().enumerate() {
        let _ = writeln!(out, "Layer {} (parallel):", index);
        for task_id in layer {
            let kind = workflow
                .task(task_id)
                .map(|t| t.kind.name())
                .unwrap_or("unknown");
            let preds = workflow.predecessors(task_id);
            if preds.is_empty() {
                let _ = writeln!(out, "  {} ({})", task_id, kind);
            } else {
                let mut upstream = preds.to_vec();
                upstream.sort();
                let _ = writeln!(out, "  {} ({})  <- {}", task_id, kind, upstream.join(", "));
            }
        }
    }

    Ok(out)
}
