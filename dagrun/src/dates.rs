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

//! # Date Expressions
//!
//! Evaluation of time tokens of the form `${<format>[±N]}`, e.g.
//! `${yyyy-MM-dd-1}` or `${yyyyMMdd+7}`. The format body uses the
//! data-platform convention (`yyyy`, `MM`, `dd`, `HH`, `mm`, `ss`) and the
//! optional suffix shifts the reference date by whole days.
//!
//! A token body is only treated as a date expression when it consists
//! entirely of date-pattern characters and contains at least one unit token.
//! This keeps ordinary parameter names that happen to contain `mm` or `dd`
//! (such as `command`) out of the date path.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

/// Canonical date form used throughout backfill plans.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

const UNIT_TOKENS: [&str; 6] = ["yyyy", "MM", "dd", "HH", "mm", "ss"];

static OFFSET_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-]\d+)$").unwrap());

/// Outcome of inspecting a template token body as a date expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateExpr {
    /// The body was a date expression; this is the formatted value.
    Value(String),
    /// The body resembled a date expression but the offset did not parse.
    Malformed,
    /// The body is not a date expression at all.
    NotADate,
}

/// Evaluate a token body against the run's reference instant.
pub fn evaluate(body: &str, reference: NaiveDateTime) -> DateExpr {
    let (format_part, offset_part) = match OFFSET_SUFFIX.find(body) {
        Some(m) => (&body[..m.start()], Some(m.as_str())),
        None => (body, None),
    };

    if !is_date_pattern(format_part) {
        return DateExpr::NotADate;
    }

    let offset_days: i64 = match offset_part {
        None => 0,
        Some(raw) => match raw.parse() {
            Ok(n) => n,
            Err(_) => return DateExpr::Malformed,
        },
    };

    let Some(delta) = Duration::try_days(offset_days) else {
        return DateExpr::Malformed;
    };
    let Some(target) = reference.checked_add_signed(delta) else {
        return DateExpr::Malformed;
    };
    DateExpr::Value(target.format(&to_strftime(format_part)).to_string())
}

/// Whether `body` consists solely of date-pattern characters and contains at
/// least one unit token.
fn is_date_pattern(body: &str) -> bool {
    !body.is_empty()
        && body
            .chars()
            .all(|c| matches!(c, 'y' | 'M' | 'd' | 'H' | 'm' | 's' | '-' | '/' | ':' | '.' | ' '))
        && UNIT_TOKENS.iter().any(|unit| body.contains(unit))
}

/// Translate a `yyyy-MM-dd` style pattern into strftime codes.
fn to_strftime(pattern: &str) -> String {
    pattern
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

/// Parse an ISO `YYYY-MM-DD` date, as used by backfill bounds and `ref_date`.
pub fn parse_iso_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, CANONICAL_FORMAT).map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

/// Format a date in the canonical `YYYY-MM-DD` form.
pub fn canonical(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// The canonical form with dashes stripped (`YYYYMMDD`).
pub fn no_dash(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
