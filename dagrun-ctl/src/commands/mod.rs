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

pub mod backfill;
pub mod info;
pub mod run;
pub mod visualize;

use tracing::warn;

/// Split a comma-separated `--job_ids` value into trimmed task IDs.
pub fn parse_job_ids(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Resolve the interaction between `--job_ids` and `--start_from`:
/// an explicit task list wins.
pub fn selection(
    job_ids: Option<&str>,
    start_from: Option<String>,
) -> (Option<Vec<String>>, Option<String>) {
    let only_tasks = parse_job_ids(job_ids);
    if only_tasks.is_some() && start_from.is_some() {
        warn!("both --job_ids and --start_from given; --job_ids takes precedence");
        return (only_tasks, None);
    }
    (only_tasks, start_from)
}
