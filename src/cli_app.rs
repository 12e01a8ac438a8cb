//! Top-level CLI definition and dispatch.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::check::{format_check_report, run_check};
use crate::cli::daemon::run_daemon;
use crate::cli::filter::run_filter;
use crate::cli::once::run_once;
use crate::cli::report::format_step_report;
use crate::core::config::{CONFIG_ENV, ConfigFile};
use crate::core::errors::RwError;
use crate::daemon::Collaborators;

/// Release Watcher: polls upstream sources for new versions and acts on them.
#[derive(Debug, Parser)]
#[command(name = "rwatch", version, about)]
pub struct Cli {
    /// Config file path.
    #[arg(long, short = 'c', global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the watcher in the foreground until SIGINT or SIGTERM.
    Daemon,
    /// Validate the config file and list the units it defines.
    Check,
    /// Poll each unit once without running any actions.
    Once {
        /// Only poll this unit.
        #[arg(long)]
        service: Option<String>,
    },
    /// Apply a url_commands pipeline to a piece of text.
    Filter {
        /// JSON array of steps, e.g. '[{"type":"regex","regex":"v(.*)"}]'.
        #[arg(long)]
        commands: String,
        #[arg(long)]
        text: String,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Dispatch CLI commands.
///
/// # Errors
/// Returns an error if the subcommand fails, or if `check` / `once` found
/// problems.
pub fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let color = std::io::stdout().is_terminal();
    let path = ConfigFile::resolve_path(cli.config.as_deref());
    match &cli.command {
        Command::Daemon => run_daemon(&path)?,
        Command::Check => {
            let config = ConfigFile::load(&path)?;
            let report = run_check(&config, &path);
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{}", format_check_report(&report, color));
            }
            if !report.success() {
                return Err(RwError::Validation {
                    report: format!("{} problem(s) in {}", report.errors.len(), path.display()),
                }
                .into());
            }
        }
        Command::Once { service } => {
            let config = ConfigFile::load(&path)?;
            let report = run_once(&config, &Collaborators::default(), service.as_deref())?;
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{}", format_step_report(&report.steps, color));
            }
            if !report.steps.success() {
                return Err(RwError::Runtime {
                    details: format!("{} unit(s) failed", report.steps.failures()),
                }
                .into());
            }
        }
        Command::Filter { commands, text } => {
            let result = run_filter(commands, text)?;
            if cli.json {
                print_json(&result)?;
            } else if let Some(miss) = &result.miss {
                println!("miss: {miss}");
                println!("{}", result.text);
            } else {
                println!("{}", result.text);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["rwatch", "once", "--service", "argus", "--json", "-c", "x.toml"]);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Once { service: Some(ref s) } if s == "argus"));
    }
}
