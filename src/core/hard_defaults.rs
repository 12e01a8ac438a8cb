//! Compiled-in fallback layers. Every chain ends here, so every field that
//! matters at run time has a value in these tables.

use std::collections::BTreeMap;

use super::config::{
    DashboardLayer, LookupOverrides, NotifyLayer, OptionsLayer, ServiceLayer, WebHookLayer,
};
use super::defaults::{Template, TemplateSet};

/// Notifier types with a built-in delivery.
pub const NOTIFY_TYPES: &[&str] = &["discord", "generic", "gotify", "log", "slack"];
/// Webhook payload flavours.
pub const WEBHOOK_TYPES: &[&str] = &["github", "gitlab"];
/// Lookup kinds.
pub const LOOKUP_TYPES: &[&str] = &["github", "url"];

pub const DEFAULT_MESSAGE: &str = "{{ service_id }} - {{ version }} released";

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[must_use]
pub fn service() -> ServiceLayer {
    ServiceLayer {
        options: OptionsLayer {
            interval: "10m".to_string(),
            semantic_versioning: Some(true),
            active: Some(true),
            ignore_misses: Some(false),
        },
        latest_version: LookupOverrides {
            access_token: String::new(),
            allow_invalid_certs: Some(false),
            use_prerelease: Some(false),
        },
        dashboard: DashboardLayer {
            auto_approve: Some(false),
            web_url: String::new(),
            icon: String::new(),
        },
    }
}

/// Hard defaults for one notifier type. Unknown types get the shared options
/// only.
#[must_use]
pub fn notify(kind: &str) -> NotifyLayer {
    let params = match kind {
        "discord" => map(&[("username", "rwatch")]),
        "gotify" => map(&[("priority", "0"), ("title", "rwatch")]),
        "generic" => map(&[("title", "{{ service_id }}")]),
        _ => BTreeMap::new(),
    };
    NotifyLayer {
        kind: String::new(),
        options: map(&[("delay", "0s"), ("max_tries", "3"), ("message", DEFAULT_MESSAGE)]),
        url_fields: BTreeMap::new(),
        params,
    }
}

#[must_use]
pub fn notify_set() -> TemplateSet<NotifyLayer> {
    let mut set = TemplateSet::new();
    for kind in NOTIFY_TYPES {
        set.insert(*kind, notify(kind));
    }
    set
}

#[must_use]
pub fn webhook() -> WebHookLayer {
    WebHookLayer {
        kind: "github".to_string(),
        delay: "0s".to_string(),
        max_tries: Some(3),
        allow_invalid_certs: Some(false),
        desired_status_code: Some(0),
        silent_fails: Some(false),
        ..WebHookLayer::default()
    }
}

/// The full set of hard-default templates, built once per load.
#[derive(Debug, Clone)]
pub struct HardDefaults {
    pub service: Template<ServiceLayer>,
    pub notify: TemplateSet<NotifyLayer>,
    pub webhook: Template<WebHookLayer>,
}

impl HardDefaults {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: Template::new(service()),
            notify: notify_set(),
            webhook: Template::new(webhook()),
        }
    }

    /// Make sure a hard-default layer exists for `kind`, even when the type is
    /// unknown, so resolution stays total.
    pub fn ensure_notify(&mut self, kind: &str) {
        if !self.notify.contains(kind) {
            self.notify.insert(kind, notify(kind));
        }
    }
}

impl Default for HardDefaults {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_notify_type_has_delivery_options() {
        let set = notify_set();
        for kind in NOTIFY_TYPES {
            let layer = set.get(kind).unwrap().read().clone();
            for key in ["delay", "max_tries", "message"] {
                assert!(layer.options.contains_key(key), "{kind} lacks {key}");
            }
        }
    }

    #[test]
    fn service_defaults_cover_runtime_fields() {
        let layer = service();
        assert_eq!(layer.options.interval, "10m");
        assert_eq!(layer.options.semantic_versioning, Some(true));
        assert_eq!(layer.options.active, Some(true));
        assert_eq!(layer.dashboard.auto_approve, Some(false));
        assert_eq!(layer.latest_version.use_prerelease, Some(false));
    }

    #[test]
    fn unknown_notify_type_still_gets_a_layer() {
        let mut hard = HardDefaults::new();
        hard.ensure_notify("pager");
        let layer = hard.notify.get("pager").unwrap().read().clone();
        assert_eq!(layer.options["max_tries"], "3");
    }
}
