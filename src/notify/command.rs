//! Local commands run when a new version is approved.

use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::core::template::{TemplateVars, render};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to start {program}: {details}")]
    Spawn { program: String, details: String },

    #[error("{program} exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> Result<(), CommandError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(&self, argv: &[String]) -> Result<(), CommandError> {
        (**self).run(argv)
    }
}

/// Runs commands as child processes and waits for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String]) -> Result<(), CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
        debug!(program = %program, args = args.len(), "running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| CommandError::Spawn {
                program: program.clone(),
                details: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CommandError::Exit {
                program: program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Expand `{{ ... }}` placeholders in every argument.
#[must_use]
pub fn render_argv(argv: &[String], vars: &TemplateVars<'_>) -> Vec<String> {
    argv.iter().map(|arg| render(arg, vars)).collect()
}

/// `program arg1 arg2` for logs and reports.
#[must_use]
pub fn display_argv(argv: &[String]) -> String {
    argv.join(" ")
}
