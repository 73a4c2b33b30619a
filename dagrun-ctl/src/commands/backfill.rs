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

use std::io::Write;
use std::path::Path;

use dagrun::{dates, BackfillSpec, Engine, EngineError, RunOptions, WorkflowConfig};
use serde_json::json;
use tracing::{error, info, warn};

use crate::cli::exit;
use crate::commands::selection;
use crate::output::print_summary;

/// Execute a workflow over a backfill date plan, one date point at a time.
/// Returns 0 only when every date point returns 0.
pub async fn execute(
    config_path: &Path,
    backfill_params_path: &Path,
    job_ids: Option<&str>,
    start_from: Option<String>,
    auto_confirm: bool,
) -> i32 {
    let config = match WorkflowConfig::from_json_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return exit::CONFIG_INVALID;
        }
    };
    let spec: BackfillSpec = match load_spec(backfill_params_path) {
        Ok(spec) => spec,
        Err(message) => {
            error!("invalid backfill specification: {}", message);
            return exit::CONFIG_INVALID;
        }
    };
    let plan = match spec.plan() {
        Ok(plan) => plan,
        Err(e) => {
            error!("invalid backfill specification: {}", e);
            return exit::CONFIG_INVALID;
        }
    };
    if plan.points.is_empty() {
        warn!("backfill plan contains no date points; nothing to do");
        return exit::SUCCESS;
    }

    let (only_tasks, start_from) = selection(job_ids, start_from);
    print_plan(&spec, &plan, only_tasks.as_deref(), start_from.as_deref());

    if plan.dry_run {
        println!("\nDry run: overlays per date point");
        for point in &plan.points {
            println!("\n[{}]", point.date);
            for (key, value) in point.overlay.iter() {
                println!("  {} = {}", key, value);
            }
        }
        return exit::SUCCESS;
    }

    if !auto_confirm && !confirm_plan() {
        println!("Backfill cancelled");
        return exit::TASK_FAILED;
    }

    let engine = Engine::new();
    let abort = engine.abort_handle();
    let mut failed_dates = Vec::new();

    for point in &plan.points {
        if abort.is_aborted() {
            warn!("backfill aborted; skipping remaining date points");
            break;
        }
        info!(date = %point.date, "starting backfill date point");

        // Rebuild the workflow per date point so the overlay reaches
        // per-task parameter templates at dispatch time.
        let workflow = match config.build_workflow(None) {
            Ok(workflow) => workflow,
            Err(e) => {
                error!("invalid workflow: {}", e);
                return exit::CONFIG_INVALID;
            }
        };
        let options = RunOptions {
            only_tasks: only_tasks.clone(),
            start_from: start_from.clone(),
            backfill_date: Some(point.date),
            ..RunOptions::default()
        };

        match engine.run(&workflow, &point.overlay, &options).await {
            Ok(outcome) => {
                print_summary(&outcome);
                if !outcome.success() {
                    failed_dates.push(point.date);
                }
            }
            Err(EngineError::Validation(e)) => {
                error!("invalid workflow: {}", e);
                return exit::CONFIG_INVALID;
            }
            Err(e) => {
                error!(date = %point.date, "internal error: {}", e);
                failed_dates.push(point.date);
            }
        }
    }

    println!();
    println!(
        "Backfill finished: {} succeeded, {} failed",
        plan.points.len() - failed_dates.len(),
        failed_dates.len()
    );
    if failed_dates.is_empty() {
        return exit::SUCCESS;
    }

    let retry_spec = json!({
        "custom_dates": failed_dates.iter().map(|d| dates::canonical(*d)).collect::<Vec<_>>(),
        "date_param_names": spec.param_names(),
        "date_param_formats": spec.date_param_formats,
        "params": spec.params,
    });
    println!("Failed date points: {}", failed_dates.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "));
    println!("To retry only the failed dates, run backfill again with:");
    println!("{}", serde_json::to_string_pretty(&retry_spec).unwrap_or_default());

    exit::TASK_FAILED
}

fn load_spec(path: &Path) -> Result<BackfillSpec, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

fn print_plan(
    spec: &BackfillSpec,
    plan: &dagrun::BackfillPlan,
    only_tasks: Option<&[String]>,
    start_from: Option<&str>,
) {
    let first = plan.points.first().map(|p| p.date.to_string()).unwrap_or_default();
    let last = plan.points.last().map(|p| p.date.to_string()).unwrap_or_default();

    println!("Backfill plan:");
    println!("  dates: {} .. {} ({} points)", first, last, plan.points.len());
    println!("  date parameters: {}", spec.param_names().join(", "));
    if !spec.date_param_formats.is_empty() {
        for (name, fmt) in spec.date_param_formats.iter() {
            println!("    {} formatted as {}", name, fmt);
        }
    }
    match (only_tasks, start_from) {
        (Some(ids), _) => println!("  tasks: {}", ids.join(", ")),
        (None, Some(task)) => println!("  tasks: {} and downstream", task),
        (None, None) => println!("  tasks: all"),
    }
}

fn confirm_plan() -> bool {
    print!("Proceed with this backfill plan? [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        warn!("could not read confirmation; pass --auto_confirm in non-interactive environments");
        return false;
    }
    answer.trim().eq_ignore_ascii_case("y")
}
