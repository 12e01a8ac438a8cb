//! Step reports shared by the one-shot commands.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Ok,
    Fail,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub description: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub steps: Vec<Step>,
}

impl StepReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_ok(&mut self, description: impl Into<String>) {
        self.push(description, StepState::Ok, None);
    }

    pub fn step_fail(&mut self, description: impl Into<String>, error: impl Into<String>) {
        self.push(description, StepState::Fail, Some(error.into()));
    }

    pub fn step_skip(&mut self, description: impl Into<String>, reason: impl Into<String>) {
        self.push(description, StepState::Skip, Some(reason.into()));
    }

    fn push(&mut self, description: impl Into<String>, state: StepState, detail: Option<String>) {
        self.steps.push(Step {
            description: description.into(),
            state,
            detail,
        });
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Fail)
            .count()
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.failures() == 0
    }
}

/// Render for a terminal. `color` is off when output is piped.
#[must_use]
pub fn format_step_report(report: &StepReport, color: bool) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let icon = match step.state {
            StepState::Ok => "[ OK ]",
            StepState::Fail => "[FAIL]",
            StepState::Skip => "[SKIP]",
        };
        let icon = if color {
            match step.state {
                StepState::Ok => icon.green().to_string(),
                StepState::Fail => icon.red().bold().to_string(),
                StepState::Skip => icon.yellow().to_string(),
            }
        } else {
            icon.to_string()
        };
        let _ = writeln!(out, "  {icon} {}", step.description);
        if let Some(detail) = &step.detail {
            let _ = writeln!(out, "         {detail}");
        }
    }
    let _ = writeln!(out);
    let failures = report.failures();
    if failures == 0 {
        let _ = writeln!(out, "All {} steps passed.", report.steps.len());
    } else {
        let _ = writeln!(out, "{failures} of {} steps failed.", report.steps.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_tracking() {
        let mut report = StepReport::new();
        report.step_ok("one");
        report.step_fail("two", "boom");
        report.step_skip("three", "inactive");
        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.failures(), 1);
        assert!(!report.success());
        assert_eq!(report.steps[2].detail.as_deref(), Some("inactive"));
    }

    #[test]
    fn plain_rendering() {
        let mut report = StepReport::new();
        report.step_ok("argus: 1.2.3");
        report.step_fail("broken", "lookup failed");
        let output = format_step_report(&report, false);
        assert!(output.contains("  [ OK ] argus: 1.2.3"));
        assert!(output.contains("  [FAIL] broken"));
        assert!(output.contains("         lookup failed"));
        assert!(output.contains("1 of 2 steps failed."));
    }

    #[test]
    fn all_passed_summary() {
        let mut report = StepReport::new();
        report.step_ok("a");
        assert!(format_step_report(&report, false).contains("All 1 steps passed."));
    }
}
