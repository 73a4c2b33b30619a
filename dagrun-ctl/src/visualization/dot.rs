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

use dagrun::Workflow;

/// Render the workflow DAG in Graphviz DOT form.
pub fn render_dot(workflow: &Workflow) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "digraph \"{}\" {{", workflow.name());
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box];");
    let _ = writeln!(out);

    // Add nodes
    for task_id in workflow.task_ids() {
        let kind = workflow
            .task(&task_id)
            .map(|t| t.kind.name())
            .unwrap_or("unknown");
        let _ = writeln!(out, "  \"{}\" [label=\"{}\\n({})\"];", task_id, task_id, kind);
    }

    let _ = writeln!(out);

    // Add edges
    for (from, to) in workflow.edges() {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", from, to);
    }

    let _ = writeln!(out, "}}");
    out
}
