//! `rwatch check`: validate a config file without running anything.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::core::config::ConfigFile;
use crate::core::validation::ValidationReport;
use crate::service::Catalog;
use crate::status::Channels;

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub config_path: PathBuf,
    /// Units that would be scheduled.
    pub units: Vec<String>,
    pub excluded: Vec<String>,
    pub errors: ValidationReport,
}

impl CheckReport {
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[must_use]
pub fn run_check(config: &ConfigFile, path: &Path) -> CheckReport {
    let catalog = Catalog::build(config, &Channels::default(), None);
    CheckReport {
        config_path: path.to_path_buf(),
        units: catalog.services.keys().cloned().collect(),
        excluded: catalog.excluded,
        errors: catalog.report,
    }
}

#[must_use]
pub fn format_check_report(report: &CheckReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Config: {}", report.config_path.display());
    let _ = writeln!(
        out,
        "Units: {} ok, {} excluded",
        report.units.len(),
        report.excluded.len()
    );
    if report.success() {
        let line = "Configuration is valid.";
        let line = if color {
            line.green().to_string()
        } else {
            line.to_string()
        };
        let _ = writeln!(out, "{line}");
        return out;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.errors);
    let line = format!("{} problem(s) found.", report.errors.len());
    let _ = writeln!(out, "{}", if color { line.red().to_string() } else { line });
    out
}
