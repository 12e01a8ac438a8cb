//! Invoking the `curl` binary.
//!
//! Only fixed flags go on the command line. The URL, headers and request
//! body are written to curl's stdin as a config file (`--config -`), so
//! tokens and webhook secrets never show up in the process table.

use std::io::{self, Write as _};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurlInvocation {
    /// Command-line arguments after `curl`, ending in `--config -`.
    args: Vec<String>,
    /// Config text fed on stdin.
    config: String,
}

impl CurlInvocation {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut invocation = Self::default();
        invocation
            .flag("--max-time")
            .flag(timeout.as_secs().max(1).to_string());
        invocation
    }

    /// Add a non-secret command-line argument.
    pub fn flag(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Add `name = "value"` to the stdin config.
    pub fn option(&mut self, name: &str, value: &str) -> &mut Self {
        self.config.push_str(name);
        self.config.push_str(" = ");
        self.config.push_str(&quote(value));
        self.config.push('\n');
        self
    }

    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.option("header", &format!("{name}: {value}"))
    }

    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--config".to_string());
        args.push("-".to_string());
        args
    }

    #[must_use]
    pub fn config(&self) -> &str {
        &self.config
    }

    /// Spawn curl, stream the config and wait for it to exit.
    pub fn output(&self) -> io::Result<Output> {
        let mut child = Command::new("curl")
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(self.config.as_bytes())?;
        }
        child.wait_with_output()
    }
}

/// Quote `value` for a curl config file.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_land_in_config_not_args() {
        let mut curl = CurlInvocation::new(Duration::from_secs(30));
        curl.flag("-fsSL")
            .header("Authorization", "token s3cret")
            .option("url", "https://example.com/x");
        assert_eq!(curl.args(), ["--max-time", "30", "-fsSL", "--config", "-"]);
        assert_eq!(
            curl.config(),
            "header = \"Authorization: token s3cret\"\nurl = \"https://example.com/x\"\n"
        );
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote(r#"{"a":"b\c"}"#), r#""{\"a\":\"b\\c\"}""#);
        assert_eq!(quote("one\ntwo\tthree"), r#""one\ntwo\tthree""#);
    }

    #[test]
    fn timeout_is_at_least_one_second() {
        assert_eq!(CurlInvocation::new(Duration::ZERO).args()[1], "1");
    }
}
