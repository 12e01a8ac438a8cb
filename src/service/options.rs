//! Service-level settings resolved through `[defaults.service]` and the hard
//! defaults.

use std::time::Duration;

use crate::core::config::{ServiceLayer, parse_duration};
use crate::core::defaults::{OverrideChain, Template};
use crate::core::validation::ValidationReport;

/// Used only if every tier, hard defaults included, lacks a usable interval.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    layer: ServiceLayer,
    chain: OverrideChain<ServiceLayer>,
}

impl ServiceSettings {
    #[must_use]
    pub fn new(
        layer: ServiceLayer,
        defaults: &Template<ServiceLayer>,
        hard_defaults: &Template<ServiceLayer>,
    ) -> Self {
        Self {
            layer,
            chain: OverrideChain::new(None, defaults.clone(), hard_defaults.clone()),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        parse_duration(&self.chain.resolve(&self.layer, |l| l.options.interval.clone()))
            .filter(|d| !d.is_zero())
            .unwrap_or(FALLBACK_INTERVAL)
    }

    #[must_use]
    pub fn semantic_versioning(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.options.semantic_versioning)
            .unwrap_or(true)
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.options.active)
            .unwrap_or(true)
    }

    #[must_use]
    pub fn ignore_misses(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.options.ignore_misses)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn auto_approve(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.dashboard.auto_approve)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn web_url(&self) -> String {
        self.chain.resolve(&self.layer, |l| l.dashboard.web_url.clone())
    }

    #[must_use]
    pub fn icon(&self) -> String {
        self.chain.resolve(&self.layer, |l| l.dashboard.icon.clone())
    }

    #[must_use]
    pub fn access_token(&self) -> String {
        self.chain
            .resolve(&self.layer, |l| l.latest_version.access_token.clone())
    }

    #[must_use]
    pub fn allow_invalid_certs(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.latest_version.allow_invalid_certs)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn use_prerelease(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.latest_version.use_prerelease)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut options = ValidationReport::new();
        let interval = self.chain.resolve(&self.layer, |l| l.options.interval.clone());
        if !interval.is_empty() && parse_duration(&interval).is_none() {
            options.invalid("interval", &interval, "expected a duration like 1h2m3s");
        }
        let mut report = ValidationReport::new();
        report.nest("options", options);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OptionsLayer;
    use crate::core::hard_defaults;

    fn settings(own: ServiceLayer, defaults: ServiceLayer) -> ServiceSettings {
        ServiceSettings::new(
            own,
            &Template::new(defaults),
            &Template::new(hard_defaults::service()),
        )
    }

    #[test]
    fn hard_defaults_fill_everything() {
        let s = settings(ServiceLayer::default(), ServiceLayer::default());
        assert_eq!(s.interval(), Duration::from_secs(600));
        assert!(s.semantic_versioning());
        assert!(s.active());
        assert!(!s.auto_approve());
        assert!(!s.ignore_misses());
        assert!(!s.use_prerelease());
        assert_eq!(s.web_url(), "");
        assert!(s.validate().is_empty());
    }

    #[test]
    fn defaults_then_instance_override() {
        let defaults = ServiceLayer {
            options: OptionsLayer {
                interval: "30m".into(),
                semantic_versioning: Some(false),
                active: None,
                ignore_misses: Some(true),
            },
            ..ServiceLayer::default()
        };
        let mut own = ServiceLayer::default();
        own.options.interval = "45s".into();
        own.dashboard.auto_approve = Some(true);
        let s = settings(own, defaults);
        assert_eq!(s.interval(), Duration::from_secs(45));
        assert!(!s.semantic_versioning());
        assert!(s.ignore_misses());
        assert!(s.auto_approve());
    }

    #[test]
    fn bad_interval_is_reported() {
        let mut own = ServiceLayer::default();
        own.options.interval = "often".into();
        let s = settings(own, ServiceLayer::default());
        assert_eq!(s.interval(), FALLBACK_INTERVAL);
        assert!(s.validate().to_string().contains("interval: \"often\" <invalid>"));
    }
}
