//! `rwatch filter`: run a url_commands pipeline over a piece of text.

use serde::Serialize;

use crate::core::errors::Result;
use crate::filter::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterResult {
    pub matched: bool,
    /// The pipeline output, or the text as it stood at the missing step.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miss: Option<String>,
}

/// Compile `commands` (a JSON array of steps) and apply it to `text`.
/// Invalid steps are an error; a miss is a normal result.
pub fn run_filter(commands: &str, text: &str) -> Result<FilterResult> {
    let pipeline = Pipeline::from_json(commands)?;
    Ok(match pipeline.run(text) {
        Ok(output) => FilterResult {
            matched: true,
            text: output,
            miss: None,
        },
        Err(miss) => FilterResult {
            matched: false,
            miss: Some(miss.message().to_string()),
            text: miss.into_text(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_then_split() {
        let result = run_filter(
            r#"[{"type":"regex","regex":"v([0-9.]+)"},{"type":"split","text":".","index":0}]"#,
            "release v12.3.4",
        )
        .unwrap();
        assert!(result.matched);
        assert_eq!(result.text, "12");
    }

    #[test]
    fn miss_keeps_text() {
        let result = run_filter(
            r#"[{"type":"regex","regex":"([h-z]+)[0-9]+"}]"#,
            "abc123-def456",
        )
        .unwrap();
        assert!(!result.matched);
        assert_eq!(result.text, "abc123-def456");
        assert!(result.miss.is_some());
    }

    #[test]
    fn invalid_steps_are_errors() {
        assert!(run_filter(r#"[{"type":"split"}]"#, "x").is_err());
        assert!(run_filter("not json", "x").is_err());
    }
}
