//! Where candidate versions come from.
//!
//! A [`VersionSource`] turns a resolved [`LookupRequest`] into the text the
//! filter pipeline runs on. The built-in [`CurlSource`] shells out to `curl`;
//! tests plug in static sources.

pub mod curl;

use std::fmt;

use serde::Serialize;

use crate::core::errors::Result;

pub use curl::{CurlSource, select_release};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    /// GitHub releases of `owner/repo`.
    Github,
    /// Body of an arbitrary URL.
    Url,
}

impl LookupKind {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "github" => Some(Self::Github),
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Github => "github",
            Self::Url => "url",
        })
    }
}

/// A fully resolved lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub service_id: String,
    pub kind: LookupKind,
    /// `owner/repo` for GitHub, otherwise the URL to fetch.
    pub url: String,
    pub access_token: String,
    pub allow_invalid_certs: bool,
    pub use_prerelease: bool,
}

pub trait VersionSource: Send + Sync {
    fn fetch(&self, request: &LookupRequest) -> Result<String>;
}

impl<S: VersionSource + ?Sized> VersionSource for std::sync::Arc<S> {
    fn fetch(&self, request: &LookupRequest) -> Result<String> {
        (**self).fetch(request)
    }
}
