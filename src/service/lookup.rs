//! The latest-version lookup of one unit: where to fetch, how to filter and
//! what the result must satisfy.

use crate::core::config::LatestVersionConfig;
use crate::core::validation::ValidationReport;
use crate::filter::{Pipeline, Require};
use crate::source::{LookupKind, LookupRequest};

use super::options::ServiceSettings;

#[derive(Debug, Clone)]
pub struct LatestVersionLookup {
    pub kind: LookupKind,
    pub url: String,
    pub pipeline: Pipeline,
    pub require: Require,
}

/// Reduce a GitHub URL to `owner/repo`. Anything else is returned trimmed.
#[must_use]
pub fn normalize_github(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let path = ["https://github.com/", "http://github.com/", "github.com/"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            format!("{owner}/{repo}")
        }
        _ => path.to_string(),
    }
}

fn is_owner_repo(value: &str) -> bool {
    let mut parts = value.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    )
}

impl LatestVersionLookup {
    /// Validate and compile. Errors are relative to `latest_version`.
    pub fn compile(config: &LatestVersionConfig) -> Result<Self, ValidationReport> {
        let mut report = ValidationReport::new();
        let kind = if config.kind.is_empty() {
            report.required("type");
            None
        } else {
            let kind = LookupKind::parse(&config.kind);
            if kind.is_none() {
                report.invalid("type", &config.kind, "expected one of github, url");
            }
            kind
        };

        let url = match kind {
            Some(LookupKind::Github) => normalize_github(&config.url),
            _ => config.url.trim().to_string(),
        };
        if url.is_empty() {
            report.required("url");
        } else if kind == Some(LookupKind::Github) && !is_owner_repo(&url) {
            report.invalid("url", &config.url, "expected owner/repo or a github.com URL");
        }

        let pipeline = Pipeline::compile(&config.url_commands)
            .map_err(|errors| report.extend(errors))
            .ok();
        let require = Require::compile(&config.require)
            .map_err(|errors| report.extend(errors))
            .ok();

        match (kind, pipeline, require) {
            (Some(kind), Some(pipeline), Some(require)) if report.is_empty() => Ok(Self {
                kind,
                url,
                pipeline,
                require,
            }),
            _ => Err(report),
        }
    }

    #[must_use]
    pub fn request(&self, service_id: &str, settings: &ServiceSettings) -> LookupRequest {
        LookupRequest {
            service_id: service_id.to_string(),
            kind: self.kind,
            url: self.url.clone(),
            access_token: settings.access_token(),
            allow_invalid_certs: settings.allow_invalid_certs(),
            use_prerelease: settings.use_prerelease(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{RequireSpec, UrlCommandSpec};

    fn config(kind: &str, url: &str) -> LatestVersionConfig {
        LatestVersionConfig {
            kind: kind.into(),
            url: url.into(),
            ..LatestVersionConfig::default()
        }
    }

    #[test]
    fn github_urls_normalize() {
        assert_eq!(normalize_github("https://github.com/release-argus/Argus"), "release-argus/Argus");
        assert_eq!(normalize_github("https://github.com/owner/repo.git/"), "owner/repo");
        assert_eq!(normalize_github("https://github.com/owner/repo/releases"), "owner/repo");
        assert_eq!(normalize_github("owner/repo"), "owner/repo");
    }

    #[test]
    fn compiles_valid_github_lookup() {
        let lookup = LatestVersionLookup::compile(&config("github", "https://github.com/a/b")).unwrap();
        assert_eq!(lookup.kind, LookupKind::Github);
        assert_eq!(lookup.url, "a/b");
        assert!(lookup.pipeline.is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let mut cfg = config("ftp", "");
        cfg.url_commands = vec![UrlCommandSpec {
            kind: "split".into(),
            ..UrlCommandSpec::default()
        }];
        cfg.require = RequireSpec {
            regex_content: None,
            regex_version: Some("(".into()),
        };
        let report = LatestVersionLookup::compile(&cfg).unwrap_err();
        let rendered = report.to_string();
        assert!(rendered.contains("type: \"ftp\" <invalid>"));
        assert!(rendered.contains("url: <required>"));
        assert!(report.touches(&["url_commands", "item_0"]));
        assert!(report.touches(&["require"]));
    }

    #[test]
    fn github_url_must_name_a_repo() {
        let report = LatestVersionLookup::compile(&config("github", "just-an-owner")).unwrap_err();
        assert!(report.to_string().contains("url: \"just-an-owner\" <invalid>"));
    }

    #[test]
    fn missing_type_is_required() {
        let report = LatestVersionLookup::compile(&config("", "https://example.com")).unwrap_err();
        assert!(report.to_string().contains("type: <required>"));
    }
}
