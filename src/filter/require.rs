//! Requirement checks a candidate version must pass before it is accepted.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::validation::ValidationReport;

/// Placeholder substituted with the (escaped) candidate version.
pub const VERSION_PLACEHOLDER: &str = "{{ version }}";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireSpec {
    /// Must match the fetched body. May reference `{{ version }}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_content: Option<String>,
    /// Must match the candidate version itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_version: Option<String>,
}

/// Which check rejected the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequireMiss {
    Content { pattern: String },
    Version { pattern: String, version: String },
}

impl fmt::Display for RequireMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content { pattern } => {
                write!(f, "regex_content ({pattern}) didn't match the fetched content")
            }
            Self::Version { pattern, version } => {
                write!(f, "regex_version ({pattern}) didn't match {version:?}")
            }
        }
    }
}

impl std::error::Error for RequireMiss {}

/// Compiled requirement checks.
#[derive(Debug, Clone, Default)]
pub struct Require {
    content: Option<String>,
    version: Option<Regex>,
}

fn expand(pattern: &str, version: &str) -> String {
    pattern.replace(VERSION_PLACEHOLDER, &regex::escape(version))
}

impl Require {
    pub fn compile(spec: &RequireSpec) -> Result<Self, ValidationReport> {
        let mut report = ValidationReport::new();
        let content = spec.regex_content.clone().filter(|p| !p.is_empty());
        if let Some(pattern) = &content {
            if Regex::new(&expand(pattern, "0.0.0")).is_err() {
                report.invalid("regex_content", pattern, "invalid regex");
            }
        }
        let version = match spec.regex_version.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(_) => {
                    report.invalid("regex_version", pattern, "invalid regex");
                    None
                }
            },
            None => None,
        };
        if report.is_empty() {
            Ok(Self { content, version })
        } else {
            let mut wrapped = ValidationReport::new();
            wrapped.nest("require", report);
            Err(wrapped)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.version.is_none()
    }

    #[must_use]
    pub const fn has_content_check(&self) -> bool {
        self.content.is_some()
    }

    pub fn check_version(&self, version: &str) -> Result<(), RequireMiss> {
        match &self.version {
            Some(re) if !re.is_match(version) => Err(RequireMiss::Version {
                pattern: re.as_str().to_string(),
                version: version.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn check_content(&self, body: &str, version: &str) -> Result<(), RequireMiss> {
        let Some(pattern) = &self.content else {
            return Ok(());
        };
        let matched = Regex::new(&expand(pattern, version)).is_ok_and(|re| re.is_match(body));
        if matched {
            Ok(())
        } else {
            Err(RequireMiss::Content {
                pattern: pattern.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn require(content: Option<&str>, version: Option<&str>) -> Require {
        Require::compile(&RequireSpec {
            regex_content: content.map(String::from),
            regex_version: version.map(String::from),
        })
        .unwrap()
    }

    #[test]
    fn empty_spec_accepts_everything() {
        let req = require(None, None);
        assert!(req.is_empty());
        assert!(req.check_version("anything").is_ok());
        assert!(req.check_content("", "1.0.0").is_ok());
    }

    #[test]
    fn version_pattern_rejects_non_matching() {
        let req = require(None, Some(r"^[0-9]+\.[0-9]+\.[0-9]+$"));
        assert!(req.check_version("1.2.3").is_ok());
        let miss = req.check_version("1.2.3-rc1").unwrap_err();
        assert!(matches!(miss, RequireMiss::Version { .. }));
    }

    #[test]
    fn content_pattern_substitutes_escaped_version() {
        let req = require(Some(r"app-{{ version }}\.tar\.gz"), None);
        assert!(req.has_content_check());
        let body = "assets: app-1.2.3.tar.gz app-1.2.2.tar.gz";
        assert!(req.check_content(body, "1.2.3").is_ok());
        assert!(req.check_content(body, "1.2.4").is_err());
        // the dots in the version are literal
        assert!(req.check_content("app-1x2x3.tar.gz", "1.2.3").is_err());
    }

    #[test]
    fn invalid_patterns_are_reported_under_require() {
        let report = Require::compile(&RequireSpec {
            regex_content: Some("[0-".into()),
            regex_version: Some("(".into()),
        })
        .unwrap_err();
        assert_eq!(report.len(), 2);
        assert!(report.touches(&["require"]));
        assert!(report.to_string().starts_with("require:\n  regex_content: \"[0-\" <invalid>"));
    }
}
