//! Aggregated, path-tagged configuration validation errors.
//!
//! Validators never stop at the first problem. Each returns a
//! [`ValidationReport`] with paths relative to the value it checked, and the
//! caller nests it under its own segment, so the final report for a whole
//! config file renders as an indented tree:
//!
//! ```text
//! service:
//!   example:
//!     url_commands:
//!       item_0:
//!         regex: <required>
//! ```

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;

use super::errors::RwError;

/// What is wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    Required,
    Invalid { value: String, reason: String },
}

/// One offending field, addressed by its path from the report root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: Vec<String>,
    pub field: String,
    pub problem: Problem,
}

impl FieldError {
    /// Dotted location, e.g. `service.example.url_commands.item_0.regex`.
    #[must_use]
    pub fn location(&self) -> String {
        let mut parts = self.path.clone();
        parts.push(self.field.clone());
        parts.join(".")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, field: impl Into<String>) {
        self.errors.push(FieldError {
            path: Vec::new(),
            field: field.into(),
            problem: Problem::Required,
        });
    }

    pub fn invalid(
        &mut self,
        field: impl Into<String>,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) {
        self.errors.push(FieldError {
            path: Vec::new(),
            field: field.into(),
            problem: Problem::Invalid {
                value: value.to_string(),
                reason: reason.into(),
            },
        });
    }

    /// Absorb `other`, prefixing every path with `segment`.
    pub fn nest(&mut self, segment: impl Into<String>, other: Self) {
        if other.errors.is_empty() {
            return;
        }
        let segment = segment.into();
        for mut error in other.errors {
            error.path.insert(0, segment.clone());
            self.errors.push(error);
        }
    }

    /// Absorb `other` as is. Use when it already carries its own root.
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether any error sits at or below `prefix`.
    #[must_use]
    pub fn touches(&self, prefix: &[&str]) -> bool {
        self.errors.iter().any(|error| {
            error.path.len() >= prefix.len()
                && error
                    .path
                    .iter()
                    .zip(prefix)
                    .all(|(have, want)| have == want)
        })
    }

    /// `Ok(())` when empty, otherwise an [`RwError::Validation`] carrying the
    /// rendered tree.
    pub fn into_result(self) -> Result<(), RwError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RwError::Validation {
                report: self.to_string(),
            })
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous: &[String] = &[];
        let mut first = true;
        for error in &self.errors {
            let shared = previous
                .iter()
                .zip(&error.path)
                .take_while(|(a, b)| a == b)
                .count();
            for (depth, segment) in error.path.iter().enumerate().skip(shared) {
                if !first {
                    writeln!(f)?;
                }
                first = false;
                write!(f, "{:indent$}{segment}:", "", indent = depth * 2)?;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            let indent = error.path.len() * 2;
            match &error.problem {
                Problem::Required => write!(f, "{:indent$}{}: <required>", "", error.field)?,
                Problem::Invalid { value, reason } => write!(
                    f,
                    "{:indent$}{}: {value:?} <invalid> ({reason})",
                    "", error.field
                )?,
            }
            previous = &error.path;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_renders_nothing_and_is_ok() {
        let report = ValidationReport::new();
        assert_eq!(report.to_string(), "");
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn nested_errors_render_as_tree() {
        let mut item = ValidationReport::new();
        item.required("regex");
        let mut second = ValidationReport::new();
        second.required("new");
        second.required("old");

        let mut commands = ValidationReport::new();
        commands.nest("item_0", item);
        commands.nest("item_1", second);

        let mut root = ValidationReport::new();
        root.nest("url_commands", commands);

        let rendered = root.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "url_commands:",
                "  item_0:",
                "    regex: <required>",
                "  item_1:",
                "    new: <required>",
                "    old: <required>",
            ]
        );
    }

    #[test]
    fn invalid_values_are_quoted_with_reason() {
        let mut report = ValidationReport::new();
        report.invalid("type", "something", "expected one of regex, replace, split");
        assert_eq!(
            report.to_string(),
            "type: \"something\" <invalid> (expected one of regex, replace, split)"
        );
    }

    #[test]
    fn touches_matches_path_prefix() {
        let mut inner = ValidationReport::new();
        inner.required("url");
        let mut root = ValidationReport::new();
        root.nest("alpha", inner);
        let mut wrapped = ValidationReport::new();
        wrapped.nest("service", root);

        assert!(wrapped.touches(&["service", "alpha"]));
        assert!(!wrapped.touches(&["service", "beta"]));
        assert_eq!(wrapped.errors()[0].location(), "service.alpha.url");
    }

    #[test]
    fn extend_keeps_existing_roots() {
        let mut lookup = ValidationReport::new();
        lookup.required("url");
        let mut pipeline = ValidationReport::new();
        pipeline.nest("url_commands", {
            let mut item = ValidationReport::new();
            item.required("text");
            item
        });
        lookup.extend(pipeline);
        let locations: Vec<String> = lookup.errors().iter().map(FieldError::location).collect();
        assert_eq!(locations, vec!["url", "url_commands.text"]);
    }

    #[test]
    fn into_result_carries_rendered_tree() {
        let mut report = ValidationReport::new();
        report.required("url");
        let err = report.into_result().unwrap_err();
        assert_eq!(err.code(), "RW-1004");
        assert!(err.to_string().contains("url: <required>"));
    }
}
