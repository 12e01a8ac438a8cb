//! `{{ name }}` substitution for messages, command arguments and web URLs.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").ok());

/// Values available to templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub service_id: &'a str,
    pub version: &'a str,
    pub web_url: &'a str,
}

impl TemplateVars<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "service_id" => Some(self.service_id),
            "version" => Some(self.version),
            "web_url" => Some(self.web_url),
            _ => None,
        }
    }
}

/// Replace every known placeholder. Unknown placeholders are left as written.
#[must_use]
pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let Some(re) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures<'_>| {
        vars.lookup(&caps[1])
            .map_or_else(|| caps[0].to_string(), str::to_string)
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_names_with_or_without_spaces() {
        let vars = TemplateVars {
            service_id: "argus",
            version: "1.2.3",
            web_url: "https://example.com",
        };
        assert_eq!(
            render("{{ service_id }} {{version}} at {{  web_url }}", &vars),
            "argus 1.2.3 at https://example.com"
        );
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let vars = TemplateVars::default();
        assert_eq!(render("{{ nope }}-{{ version }}", &vars), "{{ nope }}-");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("no templates", &TemplateVars::default()), "no templates");
    }
}
