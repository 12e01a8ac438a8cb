//! Turning a loaded config document into runnable units.
//!
//! Every unit goes through the same steps: resolve its settings, compile its
//! lookup, attach its notifiers and webhooks to their templates, size its
//! status and validate the result. Problems from every unit are gathered
//! into one report; units with problems are left out.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{LatestVersionLookup, Service, ServiceSettings, validate_actions};
use crate::core::config::{ConfigFile, ServiceConfig, ServiceLayer};
use crate::core::defaults::{Template, TemplateSet};
use crate::core::hard_defaults::{HardDefaults, NOTIFY_TYPES};
use crate::core::metrics::Metrics;
use crate::core::validation::ValidationReport;
use crate::notify::webhook::WebHookTemplates;
use crate::notify::{Notify, NotifyTemplates, WebHook};
use crate::status::{Channels, Status};

#[derive(Debug, Default)]
pub struct Catalog {
    pub services: BTreeMap<String, Arc<Service>>,
    /// Ids left out because they failed validation.
    pub excluded: Vec<String>,
    pub report: ValidationReport,
}

/// Shared templates every unit of one load attaches to.
struct Templates {
    hard: HardDefaults,
    service_defaults: Template<ServiceLayer>,
    notify: NotifyTemplates,
    webhook: WebHookTemplates,
}

impl Templates {
    fn from_config(config: &ConfigFile) -> Self {
        Self {
            hard: HardDefaults::new(),
            service_defaults: Template::new(config.defaults.service.clone()),
            notify: NotifyTemplates {
                mains: TemplateSet::from_layers(config.notify.clone()),
                defaults: TemplateSet::from_layers(config.defaults.notify.clone()),
            },
            webhook: WebHookTemplates {
                mains: TemplateSet::from_layers(config.webhook.clone()),
                defaults: Template::new(config.defaults.webhook.clone()),
            },
        }
    }
}

fn validate_templates(config: &ConfigFile) -> ValidationReport {
    let mut notify = ValidationReport::new();
    for kind in config.defaults.notify.keys() {
        if !NOTIFY_TYPES.contains(&kind.to_lowercase().as_str()) {
            notify.invalid(
                kind.clone(),
                kind,
                format!("expected one of {}", NOTIFY_TYPES.join(", ")),
            );
        }
    }
    let mut defaults = ValidationReport::new();
    defaults.nest("notify", notify);
    let mut report = ValidationReport::new();
    report.nest("defaults", defaults);
    report
}

fn build_unit(
    id: &str,
    config: &ServiceConfig,
    templates: &mut Templates,
    channels: &Channels,
    metrics: Option<&Arc<Metrics>>,
) -> Result<Service, ValidationReport> {
    let mut report = ValidationReport::new();
    let settings = ServiceSettings::new(
        config.layer(),
        &templates.service_defaults,
        &templates.hard.service,
    );
    let lookup = LatestVersionLookup::compile(&config.latest_version)
        .map_err(|errors| report.nest("latest_version", errors))
        .ok();

    let notify: Vec<Notify> = config
        .notify
        .iter()
        .map(|(name, layer)| {
            Notify::attach(
                name,
                id,
                layer.clone(),
                &mut templates.notify,
                &mut templates.hard,
                metrics,
            )
        })
        .collect();
    let webhook: Vec<WebHook> = config
        .webhook
        .iter()
        .map(|(name, layer)| {
            WebHook::attach(
                name,
                id,
                layer.clone(),
                &mut templates.webhook,
                &templates.hard.webhook,
                metrics,
            )
        })
        .collect();

    report.extend(settings.validate());
    report.extend(validate_actions(&notify, &config.command, &webhook));

    let lookup = match lookup {
        Some(lookup) if report.is_empty() => lookup,
        _ => {
            for n in &notify {
                n.remove_metrics();
            }
            for hook in &webhook {
                hook.remove_metrics();
            }
            return Err(report);
        }
    };

    let status = unit_status(id, &settings);
    status.init(
        notify.iter().map(|n| n.id.as_str()),
        config.command.len(),
        webhook.iter().map(|w| w.id.as_str()),
        channels.clone(),
    );
    let mut service = Service::new(
        id,
        settings,
        lookup,
        notify,
        config.command.clone(),
        webhook,
        status,
        config.clone(),
    );
    if let Some(metrics) = metrics {
        service.register_metrics(metrics);
    }
    Ok(service)
}

/// A status that reads the unit's web URL through its settings, so an edit
/// to `[defaults.service.dashboard]` is picked up without a rebuild.
fn unit_status(id: &str, settings: &ServiceSettings) -> Status {
    let settings = settings.clone();
    Status::with_web_url(id, move || settings.web_url())
}

impl Catalog {
    /// Build every unit in `config`. Units that fail validation are listed in
    /// `excluded` and their problems in `report`.
    #[must_use]
    pub fn build(config: &ConfigFile, channels: &Channels, metrics: Option<&Arc<Metrics>>) -> Self {
        let mut templates = Templates::from_config(config);
        let mut catalog = Self {
            report: validate_templates(config),
            ..Self::default()
        };
        let mut units = ValidationReport::new();

        for (id, unit) in &config.service {
            match build_unit(id, unit, &mut templates, channels, metrics) {
                Ok(service) => {
                    debug!(service = %id, "unit ready");
                    catalog.services.insert(id.clone(), Arc::new(service));
                }
                Err(errors) => {
                    warn!(service = %id, problems = errors.len(), "unit excluded");
                    units.nest(id.clone(), errors);
                    catalog.excluded.push(id.clone());
                }
            }
        }
        catalog.report.nest("service", units);
        catalog
    }

    /// Validate without channels or counters.
    #[must_use]
    pub fn check(config: &ConfigFile) -> ValidationReport {
        Self::build(config, &Channels::default(), None).report
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<Service>> {
        self.services.get(id)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.report.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
