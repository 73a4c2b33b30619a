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

//! # Parameter Management
//!
//! Layered parameter scopes and `${...}` template resolution.
//!
//! Parameters are plain string key/value pairs held in a [`ParamMap`], which
//! preserves insertion order so that runners emitting `--key=value` flags do
//! so deterministically. A [`ParamStore`] stacks scopes in precedence order
//! (runtime overrides, then per-task parameters, then workflow globals) and
//! returns the first match on lookup.
//!
//! The [`TemplateResolver`] expands `${name}` references inside arbitrary
//! strings. A token is handled as, in order:
//!
//! 1. a date expression (`${yyyyMMdd-1}`, see [`crate::dates`]);
//! 2. a dotted accessor (`${params.day_id}` reaches the current task's
//!    resolved parameters);
//! 3. a plain name looked up through the scope stack, recursing into the
//!    resolved value when it itself contains templates.
//!
//! Unknown names are left literal. Recursion depth is capped; on overflow the
//! remaining tokens are left literal and a warning is emitted. Both policies
//! are deliberate: a dangling reference in a SQL body is often intended for
//! the engine-side variable substitution downstream.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::dates::{self, DateExpr};

/// Maximum template recursion depth before tokens are left literal.
pub const MAX_RESOLUTION_DEPTH: usize = 8;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// An insertion-ordered map of string parameters.
///
/// JSON scalars (numbers, booleans) deserialize into their string forms, so
/// `{"retries": 3}` and `{"retries": "3"}` are equivalent inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: Vec<(String, String)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a parameter, replacing any existing value in place so the
    /// original position in the ordering is kept.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` into `self`, overwriting colliding keys.
    pub fn extend(&mut self, other: &ParamMap) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl FromIterator<(String, String)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl Serialize for ParamMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for ParamMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ParamMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = ParamMap::new();
                while let Some((key, value)) = access.next_entry::<String, ScalarString>()? {
                    map.insert(key, value.0);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

/// Deserialization helper turning JSON scalars into strings.
struct ScalarString(String);

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = ScalarString;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ScalarString(v))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ScalarString(v.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// A stack of parameter scopes, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct ParamStore<'a> {
    scopes: Vec<&'a ParamMap>,
}

impl<'a> ParamStore<'a> {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Build a store from scopes ordered highest precedence first.
    pub fn layered(scopes: Vec<&'a ParamMap>) -> Self {
        Self { scopes }
    }

    /// Append a scope with lower precedence than everything already present.
    pub fn push(&mut self, scope: &'a ParamMap) {
        self.scopes.push(scope);
    }

    /// Look up a name, returning the first match in precedence order.
    pub fn lookup(&self, name: &str) -> Option<&'a str> {
        self.scopes.iter().find_map(|scope| scope.get(name))
    }
}

/// Expands `${...}` tokens within strings against a [`ParamStore`].
pub struct TemplateResolver<'a> {
    store: ParamStore<'a>,
    reference: chrono::NaiveDateTime,
    task_scope: Option<&'a ParamMap>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(store: ParamStore<'a>, reference: chrono::NaiveDateTime) -> Self {
        Self {
            store,
            reference,
            task_scope: None,
        }
    }

    /// Attach the current task's resolved parameters, reachable from
    /// templates through the `${params.<name>}` accessor.
    pub fn with_task_scope(mut self, scope: &'a ParamMap) -> Self {
        self.task_scope = Some(scope);
        self
    }

    /// Expand all templates in `input`. Unknown names are preserved.
    pub fn resolve(&self, input: &str) -> String {
        self.resolve_inner(input, 0, None)
    }

    /// Expand templates with an additional highest-precedence scope, used by
    /// runners to expose per-invocation values such as `script_path`.
    pub fn resolve_with_extra(&self, input: &str, extra: &ParamMap) -> String {
        self.resolve_inner(input, 0, Some(extra))
    }

    fn resolve_inner(&self, input: &str, depth: usize, extra: Option<&ParamMap>) -> String {
        if !input.contains("${") {
            return input.to_string();
        }
        if depth >= MAX_RESOLUTION_DEPTH {
            warn!(
                template = input,
                "template recursion depth exceeded; leaving tokens literal"
            );
            return input.to_string();
        }
        TOKEN_PATTERN
            .replace_all(input, |caps: &Captures| {
                self.expand_token(&caps[1], &caps[0], depth, extra)
            })
            .into_owned()
    }

    fn expand_token(&self, body: &str, original: &str, depth: usize, extra: Option<&ParamMap>) -> String {
        match dates::evaluate(body, self.reference) {
            DateExpr::Value(value) => return value,
            DateExpr::Malformed => {
                warn!(token = original, "malformed date expression; leaving token literal");
                return original.to_string();
            }
            DateExpr::NotADate => {}
        }

        if let Some(extra) = extra {
            if let Some(value) = extra.get(body) {
                return self.resolve_inner(value, depth + 1, Some(extra));
            }
        }

        if let Some(name) = body.strip_prefix("params.") {
            return match self.task_scope.and_then(|scope| scope.get(name)) {
                Some(value) => value.to_string(),
                None => {
                    debug!(token = original, "unresolved task parameter accessor");
                    original.to_string()
                }
            };
        }

        match self.store.lookup(body) {
            Some(value) => self.resolve_inner(value, depth + 1, extra),
            None => {
                debug!(token = original, "unresolved template token");
                original.to_string()
            }
        }
    }
}
