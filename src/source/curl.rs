//! `curl`-backed version source.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{LookupKind, LookupRequest, VersionSource};
use crate::core::curl::CurlInvocation;
use crate::core::errors::{Result, RwError};

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct CurlSource {
    pub timeout: Duration,
    /// Base URL of the GitHub API (overridable for enterprise hosts).
    pub github_api: String,
}

impl Default for CurlSource {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            github_api: GITHUB_API.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

/// Pick the newest usable tag from a GitHub releases listing (newest first).
pub fn select_release(body: &str, use_prerelease: bool) -> std::result::Result<String, String> {
    let releases: Vec<Release> =
        serde_json::from_str(body).map_err(|e| format!("failed to parse releases: {e}"))?;
    releases
        .into_iter()
        .find(|r| !r.draft && (use_prerelease || !r.prerelease) && !r.tag_name.is_empty())
        .map(|r| r.tag_name)
        .ok_or_else(|| "no usable release found".to_string())
}

impl CurlSource {
    fn invocation(&self, request: &LookupRequest, url: &str, headers: &[(&str, String)]) -> CurlInvocation {
        let mut curl = CurlInvocation::new(self.timeout);
        curl.flag("-fsSL");
        if request.allow_invalid_certs {
            curl.flag("-k");
        }
        for (name, value) in headers {
            curl.header(name, value);
        }
        curl.option("url", url);
        curl
    }

    fn get(&self, request: &LookupRequest, url: &str, headers: &[(&str, String)]) -> Result<String> {
        debug!(service = %request.service_id, url, "fetching");
        let output = self.invocation(request, url, headers).output().map_err(|e| {
            RwError::source(&request.service_id, format!("curl not found or failed: {e}"))
        })?;
        if !output.status.success() {
            return Err(RwError::source(
                &request.service_id,
                format!(
                    "request to {url} failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn github_headers(request: &LookupRequest) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", "application/vnd.github+json".to_string())];
        if !request.access_token.is_empty() {
            headers.push(("Authorization", format!("token {}", request.access_token)));
        }
        headers
    }
}

impl VersionSource for CurlSource {
    fn fetch(&self, request: &LookupRequest) -> Result<String> {
        match request.kind {
            LookupKind::Url => self.get(request, &request.url, &[]),
            LookupKind::Github => {
                let url = format!("{}/repos/{}/releases", self.github_api, request.url);
                let body = self.get(request, &url, &Self::github_headers(request))?;
                select_release(&body, request.use_prerelease)
                    .map_err(|details| RwError::source(&request.service_id, details))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASES: &str = r#"[
        {"tag_name": "v2.0.0-rc1", "prerelease": true, "draft": false},
        {"tag_name": "v1.9.0", "prerelease": false, "draft": true},
        {"tag_name": "v1.8.2", "prerelease": false, "draft": false},
        {"tag_name": "v1.8.1"}
    ]"#;

    #[test]
    fn skips_drafts_and_prereleases() {
        assert_eq!(select_release(RELEASES, false).unwrap(), "v1.8.2");
    }

    #[test]
    fn prereleases_allowed_on_request() {
        assert_eq!(select_release(RELEASES, true).unwrap(), "v2.0.0-rc1");
    }

    #[test]
    fn empty_or_garbage_listing_is_an_error() {
        assert!(select_release("[]", true).is_err());
        assert!(select_release("{\"message\":\"Not Found\"}", true)
            .unwrap_err()
            .contains("failed to parse"));
    }

    #[test]
    fn access_token_stays_off_the_command_line() {
        let request = LookupRequest {
            service_id: "argus".into(),
            kind: LookupKind::Github,
            url: "owner/repo".into(),
            access_token: "ghp_s3cret".into(),
            allow_invalid_certs: true,
            use_prerelease: false,
        };
        let source = CurlSource::default();
        let curl = source.invocation(
            &request,
            "https://api.github.com/repos/owner/repo/releases",
            &CurlSource::github_headers(&request),
        );
        let args = curl.args();
        assert!(args.iter().all(|a| !a.contains("s3cret") && !a.contains("api.github.com")));
        assert!(args.contains(&"-k".to_string()));
        assert!(curl
            .config()
            .contains("header = \"Authorization: token ghp_s3cret\"\n"));
        assert!(curl
            .config()
            .contains("url = \"https://api.github.com/repos/owner/repo/releases\""));
    }

    #[test]
    fn default_points_at_public_api() {
        assert_eq!(CurlSource::default().github_api, "https://api.github.com");
    }
}
