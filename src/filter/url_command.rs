//! URL commands: the regex / replace / split steps that carve a version out of
//! fetched text.
//!
//! A [`Pipeline`] is compiled once from its declared [`UrlCommandSpec`]s. All
//! steps are validated before any can run, and every problem is reported in a
//! single [`ValidationReport`]. Running is pure: the same input and steps
//! always give the same output.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::validation::ValidationReport;

/// Non-matching text is echoed in miss messages only when shorter than this.
const ECHO_TEXT_LIMIT: usize = 20;

// ──────────────────── declared form ────────────────────

/// One step as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCommandSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl UrlCommandSpec {
    #[must_use]
    pub fn regex(pattern: &str, index: i64) -> Self {
        Self {
            kind: "regex".into(),
            regex: Some(pattern.into()),
            index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn replace(old: &str, new: &str) -> Self {
        Self {
            kind: "replace".into(),
            old: Some(old.into()),
            new: Some(new.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn split(text: &str, index: i64) -> Self {
        Self {
            kind: "split".into(),
            text: Some(text.into()),
            index,
            ..Self::default()
        }
    }

    /// Check this step alone. Paths in the report are relative to the step.
    fn compile(&self) -> Result<UrlCommand, ValidationReport> {
        let mut report = ValidationReport::new();
        let command = match self.kind.as_str() {
            "regex" => match self.regex.as_deref().filter(|p| !p.is_empty()) {
                None => {
                    report.required("regex");
                    None
                }
                Some(pattern) => match Regex::new(pattern) {
                    Ok(re) => Some(UrlCommand::Regex {
                        re,
                        index: self.index,
                    }),
                    Err(_) => {
                        report.invalid("regex", pattern, "invalid regex");
                        None
                    }
                },
            },
            "replace" => {
                if self.new.is_none() {
                    report.required("new");
                }
                if self.old.as_deref().is_none_or(str::is_empty) {
                    report.required("old");
                }
                match (&self.old, &self.new) {
                    (Some(old), Some(new)) if !old.is_empty() => Some(UrlCommand::Replace {
                        old: old.clone(),
                        new: new.clone(),
                    }),
                    _ => None,
                }
            }
            "split" => match self.text.as_deref().filter(|t| !t.is_empty()) {
                None => {
                    report.required("text");
                    None
                }
                Some(text) => Some(UrlCommand::Split {
                    text: text.to_string(),
                    index: self.index,
                }),
            },
            other => {
                report.invalid("type", other, "expected one of regex, replace, split");
                None
            }
        };
        command.ok_or(report)
    }
}

// ──────────────────── compiled form ────────────────────

/// A validated, ready-to-run step.
#[derive(Debug, Clone)]
pub enum UrlCommand {
    Regex { re: Regex, index: i64 },
    Replace { old: String, new: String },
    Split { text: String, index: i64 },
}

/// Why a step left the text unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissKind {
    NoMatch,
    SplitNotFound,
    OutOfBounds,
}

/// Soft failure of a step. Carries the text as it stood when the step ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMiss {
    pub kind: MissKind,
    pub step: usize,
    message: String,
    text: String,
}

impl FilterMiss {
    /// The unchanged text the failing step was given.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FilterMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FilterMiss {}

/// Map a possibly negative index onto `len` elements.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len_i + index } else { index };
    if (0..len_i).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// 1-based element number for bounds messages.
const fn element_number(index: i64) -> i64 {
    if index < 0 { index } else { index + 1 }
}

impl UrlCommand {
    /// Apply this step. On a miss the returned error holds `text` unchanged.
    pub fn apply(&self, text: &str, step: usize) -> Result<String, FilterMiss> {
        let miss = |kind, message: String| FilterMiss {
            kind,
            step,
            message,
            text: text.to_string(),
        };
        match self {
            Self::Regex { re, index } => {
                let matches: Vec<String> = re
                    .captures_iter(text)
                    .map(|caps| {
                        caps.get(caps.len() - 1)
                            .map_or_else(String::new, |m| m.as_str().to_string())
                    })
                    .collect();
                if matches.is_empty() {
                    let mut message = format!("regex ({}) didn't return any matches", re.as_str());
                    if text.len() < ECHO_TEXT_LIMIT {
                        message.push_str(&format!(" on {text:?}"));
                    }
                    return Err(miss(MissKind::NoMatch, message));
                }
                match wrap_index(*index, matches.len()) {
                    Some(i) => Ok(matches[i].clone()),
                    None => Err(miss(
                        MissKind::OutOfBounds,
                        format!(
                            "regex ({}) returned {} elements but the index wants element number {}",
                            re.as_str(),
                            matches.len(),
                            element_number(*index)
                        ),
                    )),
                }
            }
            Self::Replace { old, new } => Ok(text.replace(old.as_str(), new)),
            Self::Split { text: sep, index } => {
                let parts: Vec<&str> = text.split(sep.as_str()).collect();
                if parts.len() == 1 {
                    return Err(miss(
                        MissKind::SplitNotFound,
                        format!("split didn't find any {sep:?} to split on"),
                    ));
                }
                match wrap_index(*index, parts.len()) {
                    Some(i) => Ok(parts[i].to_string()),
                    None => Err(miss(
                        MissKind::OutOfBounds,
                        format!(
                            "split ({sep:?}) returned {} elements but the index wants element number {}",
                            parts.len(),
                            element_number(*index)
                        ),
                    )),
                }
            }
        }
    }
}

// ──────────────────── pipeline ────────────────────

/// An ordered, validated list of steps. The empty pipeline is the identity.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<UrlCommand>,
    specs: Vec<UrlCommandSpec>,
}

impl Pipeline {
    /// Validate every step and compile. Errors from all steps are collected
    /// under `url_commands` / `item_<n>`.
    pub fn compile(specs: &[UrlCommandSpec]) -> Result<Self, ValidationReport> {
        let mut items = ValidationReport::new();
        let mut steps = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            match spec.compile() {
                Ok(step) => steps.push(step),
                Err(report) => items.nest(format!("item_{i}"), report),
            }
        }
        if items.is_empty() {
            Ok(Self {
                steps,
                specs: specs.to_vec(),
            })
        } else {
            let mut report = ValidationReport::new();
            report.nest("url_commands", items);
            Err(report)
        }
    }

    /// Parse a JSON array of steps and compile it.
    pub fn from_json(json: &str) -> crate::core::errors::Result<Self> {
        let specs: Vec<UrlCommandSpec> = serde_json::from_str(json)?;
        Self::compile(&specs).map_err(|report| crate::core::errors::RwError::Validation {
            report: report.to_string(),
        })
    }

    /// Run every step in order, stopping at the first miss.
    pub fn run(&self, text: &str) -> Result<String, FilterMiss> {
        let mut current = text.to_string();
        for (i, step) in self.steps.iter().enumerate() {
            current = step.apply(&current, i)?;
        }
        Ok(current)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn specs(&self) -> &[UrlCommandSpec] {
        &self.specs
    }
}
