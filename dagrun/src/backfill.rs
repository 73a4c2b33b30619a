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

//! # Backfill Planning
//!
//! Expansion of a backfill specification into an ordered sequence of date
//! points, each carrying a fully materialised parameter overlay.
//!
//! For every date point `d` and every configured parameter name `P` the
//! overlay contains:
//!
//! - `P` — the canonical `YYYY-MM-DD` form of `d`;
//! - `P_no_dash` — the canonical form with dashes stripped;
//! - `P_fmt` — `d` formatted per `date_param_formats[P]`, when supplied.
//!
//! Static `params` from the specification merge in underneath; generated
//! date keys win on collision. Execution over the plan is strictly
//! sequential and owned by the caller.

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dates;
use crate::error::ConfigError;
use crate::params::ParamMap;

/// Spacing of generated date points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

/// A backfill specification, usually loaded from a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillSpec {
    /// Inclusive lower bound of the date range (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive upper bound of the date range (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub date_granularity: Granularity,
    /// Explicit date list; overrides the range when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_dates: Vec<String>,
    /// Primary date parameter name.
    #[serde(default = "default_date_param_name")]
    pub date_param_name: String,
    /// Multiple date parameter names; supersedes `date_param_name`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_param_names: Vec<String>,
    /// Per-name strftime format strings for the derived `_fmt` variant.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub date_param_formats: ParamMap,
    /// Produce overlays without executing anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Static overlay applied to every iteration.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub params: ParamMap,
}

fn default_date_param_name() -> String {
    "day_id".to_string()
}

/// One entry of a backfill plan.
#[derive(Debug, Clone)]
pub struct DatePoint {
    pub date: NaiveDate,
    pub overlay: ParamMap,
}

/// An ordered, fully materialised backfill plan.
#[derive(Debug, Clone)]
pub struct BackfillPlan {
    pub points: Vec<DatePoint>,
    pub dry_run: bool,
}

impl BackfillSpec {
    /// The effective list of date parameter names.
    pub fn param_names(&self) -> Vec<String> {
        if self.date_param_names.is_empty() {
            vec![self.date_param_name.clone()]
        } else {
            self.date_param_names.clone()
        }
    }

    /// Expand the specification into an ordered plan.
    pub fn plan(&self) -> Result<BackfillPlan, ConfigError> {
        let dates = self.date_points()?;
        let names = self.param_names();

        let points = dates
            .into_iter()
            .map(|date| DatePoint {
                date,
                overlay: self.overlay_for(date, &names),
            })
            .collect();

        Ok(BackfillPlan {
            points,
            dry_run: self.dry_run,
        })
    }

    fn date_points(&self) -> Result<Vec<NaiveDate>, ConfigError> {
        if !self.custom_dates.is_empty() {
            return self
                .custom_dates
                .iter()
                .map(|raw| dates::parse_iso_date(raw))
                .collect();
        }

        let (start, end) = match (&self.start_date, &self.end_date) {
            (Some(start), Some(end)) => (dates::parse_iso_date(start)?, dates::parse_iso_date(end)?),
            _ => {
                return Err(ConfigError::InvalidBackfill(
                    "either custom_dates or start_date and end_date must be provided".to_string(),
                ))
            }
        };
        if end < start {
            return Err(ConfigError::InvalidBackfill(format!(
                "end_date {} precedes start_date {}",
                end, start
            )));
        }

        Ok(match self.date_granularity {
            Granularity::Day => day_range(start, end),
            Granularity::Week => week_range(start, end),
            Granularity::Month => month_range(start, end),
        })
    }

    fn overlay_for(&self, date: NaiveDate, names: &[String]) -> ParamMap {
        let mut overlay = self.params.clone();
        for name in names {
            overlay.insert(name.clone(), dates::canonical(date));
            overlay.insert(format!("{}_no_dash", name), dates::no_dash(date));
            if let Some(fmt) = self.date_param_formats.get(name) {
                match format_date(date, fmt) {
                    Some(value) => overlay.insert(format!("{}_fmt", name), value),
                    None => warn!(
                        param = name.as_str(),
                        format = fmt,
                        "invalid date format; omitting _fmt variant"
                    ),
                }
            }
        }
        overlay
    }
}

/// Format a date with a user-supplied strftime pattern, rejecting patterns
/// chrono cannot parse instead of panicking at render time.
fn format_date(date: NaiveDate, fmt: &str) -> Option<String> {
    let items: Vec<Item> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

/// Every calendar day from `start` through `end`.
fn day_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = start;
    while current <= end {
        out.push(current);
        current += Duration::days(1);
    }
    out
}

/// Mondays stepping weekly from the Monday of `start`'s week. When `start`
/// falls mid-week the first point is the Monday of that week, which may
/// precede `start`.
fn week_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = start - Duration::days(start.weekday().num_days_from_monday() as i64);
    while current <= end {
        out.push(current);
        current += Duration::days(7);
    }
    out
}

/// The first day of each month within `[start, end]`.
fn month_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = NaiveDate::from_ymd_opt(start.year(), start.month(), 1).unwrap();
    while current <= end {
        if current >= start {
            out.push(current);
        }
        current = first_of_next_month(current);
    }
    out
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1).unwrap()
    }
}
