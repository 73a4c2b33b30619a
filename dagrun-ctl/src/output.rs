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

use dagrun::{TaskState, WorkflowOutcome};

const ERROR_PREVIEW_CHARS: usize = 120;

/// Print the per-task summary table for a finished run.
pub fn print_summary(outcome: &WorkflowOutcome) {
    let elapsed = (outcome.finished_at - outcome.started_at).num_milliseconds() as f64 / 1000.0;
    println!();
    println!(
        "Run {} of workflow '{}' finished in {:.2}s: {}",
        outcome.run_id,
        outcome.workflow,
        elapsed,
        if outcome.success() { "SUCCESS" } else { "FAILED" }
    );
    println!("{:<11} {:<28} {:>9}  {}", "STATE", "TASK", "DURATION", "ERROR");

    for (task_id, task) in &outcome.tasks {
        let duration = task
            .duration()
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        let error = task
            .error
            .as_deref()
            .map(preview)
            .unwrap_or_default();
        println!("{:<11} {:<28} {:>9}  {}", task.state, task_id, duration, error);
    }

    let cancelled = outcome.tasks_in_state(TaskState::Cancelled);
    if !cancelled.is_empty() {
        println!();
        println!("Not executed (upstream failed or run cancelled): {}", cancelled.join(", "));
    }
}

fn preview(error: &str) -> String {
    let flat = error.replace('\n', " ");
    if flat.chars().count() <= ERROR_PREVIEW_CHARS {
        flat
    } else {
        let truncated: String = flat.chars().take(ERROR_PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    }
}
