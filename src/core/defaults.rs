//! Field-by-field override resolution: instance → main → defaults → hard defaults.
//!
//! Every pluggable definition (notifiers, webhooks, service options) is a
//! partially-specified *layer*. An instance keeps its own layer plus shared,
//! read-only handles to the templates above it, and each field is resolved
//! lazily on read, so a template edited during the load phase is seen by every
//! instance without re-initialisation. Templates are only written while the
//! configuration is being loaded; once polling starts they are read-only.
//!
//! Resolution is total: hard defaults exist for every referenced type, and a
//! field that no tier sets resolves to its type's `Default`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ──────────────────── presence ────────────────────

/// Whether a candidate value counts as "set" for override purposes.
pub trait Presence {
    /// `true` when the value should win over lower tiers.
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for &str {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for u16 {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for u32 {
    fn is_present(&self) -> bool {
        true
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().is_some_and(Presence::is_present)
    }
}

/// Return the first present candidate, most specific first.
pub fn first_present<V: Presence>(candidates: impl IntoIterator<Item = V>) -> Option<V> {
    candidates.into_iter().find(Presence::is_present)
}

// ──────────────────── templates ────────────────────

/// Shared handle to one template layer.
///
/// Cloning shares the same underlying layer; it never copies values.
#[derive(Debug, Default)]
pub struct Template<T>(Arc<RwLock<T>>);

impl<T> Clone for Template<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Template<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Exclusive access. Only used while loading configuration.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Whether both handles point at the same layer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Templates keyed by identity (notifier name, notifier type, ...).
#[derive(Debug)]
pub struct TemplateSet<T> {
    entries: BTreeMap<String, Template<T>>,
}

impl<T> Default for TemplateSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Clone for TemplateSet<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: Default> TemplateSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from plain layers, wrapping each in a [`Template`].
    #[must_use]
    pub fn from_layers(layers: BTreeMap<String, T>) -> Self {
        Self {
            entries: layers
                .into_iter()
                .map(|(key, layer)| (key, Template::new(layer)))
                .collect(),
        }
    }

    /// Fetch `key`, creating an empty placeholder when absent so that later
    /// lookups can never miss.
    pub fn ensure(&mut self, key: &str) -> Template<T> {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Template::new(T::default()))
            .clone()
    }

    pub fn insert(&mut self, key: impl Into<String>, layer: T) -> Template<T> {
        let template = Template::new(layer);
        self.entries.insert(key.into(), template.clone());
        template
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Template<T>> {
        self.entries.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ──────────────────── layers ────────────────────

/// A partially-specified definition that takes part in override chains.
pub trait Layer: Default {
    /// The declared type (delivery channel / payload flavour). Empty when the
    /// type is inherited.
    fn declared_type(&self) -> &str;

    /// Drop the declared type so it is inherited from the main template.
    fn clear_type(&mut self);

    /// One-time normalisation of free-form maps (lower-cased keys).
    fn normalize(&mut self) {}
}

/// Lower-case every key of `map` in place.
///
/// When two keys collide after lower-casing, the one that was already
/// lower-case wins.
pub fn lowercase_keys(map: &mut BTreeMap<String, String>) {
    if map.keys().all(|key| !key.chars().any(char::is_uppercase)) {
        return;
    }
    let original = std::mem::take(map);
    let mut already_lower = Vec::new();
    for (key, value) in original {
        let lowered = key.to_lowercase();
        if lowered == key {
            already_lower.push((key, value));
        } else {
            map.insert(lowered, value);
        }
    }
    for (key, value) in already_lower {
        map.insert(key, value);
    }
}

// ──────────────────── chain ────────────────────

/// Read-only handles to the tiers above an instance.
#[derive(Debug)]
pub struct OverrideChain<T> {
    main: Option<Template<T>>,
    defaults: Template<T>,
    hard_defaults: Template<T>,
}

impl<T> Clone for OverrideChain<T> {
    fn clone(&self) -> Self {
        Self {
            main: self.main.clone(),
            defaults: self.defaults.clone(),
            hard_defaults: self.hard_defaults.clone(),
        }
    }
}

impl<T> OverrideChain<T> {
    #[must_use]
    pub fn new(main: Option<Template<T>>, defaults: Template<T>, hard_defaults: Template<T>) -> Self {
        Self {
            main,
            defaults,
            hard_defaults,
        }
    }

    #[must_use]
    pub fn main(&self) -> Option<&Template<T>> {
        self.main.as_ref()
    }

    #[must_use]
    pub fn defaults(&self) -> &Template<T> {
        &self.defaults
    }

    #[must_use]
    pub fn hard_defaults(&self) -> &Template<T> {
        &self.hard_defaults
    }

    /// Resolve one field. `pick` extracts the field from a layer; the first
    /// present value wins, falling back to `V::default()`.
    pub fn resolve<V, F>(&self, instance: &T, pick: F) -> V
    where
        V: Presence + Default,
        F: Fn(&T) -> V,
    {
        let own = pick(instance);
        if own.is_present() {
            return own;
        }
        if let Some(main) = &self.main {
            let value = pick(&main.read());
            if value.is_present() {
                return value;
            }
        }
        let value = pick(&self.defaults.read());
        if value.is_present() {
            return value;
        }
        let value = pick(&self.hard_defaults.read());
        if value.is_present() {
            return value;
        }
        V::default()
    }

    /// Resolve a map field key-by-key across all tiers; more specific tiers
    /// win per key.
    pub fn merge_maps<F>(&self, instance: &T, pick: F) -> BTreeMap<String, String>
    where
        F: Fn(&T) -> &BTreeMap<String, String>,
    {
        let mut merged = pick(&self.hard_defaults.read()).clone();
        merged.extend(pick(&self.defaults.read()).clone());
        if let Some(main) = &self.main {
            merged.extend(pick(&main.read()).clone());
        }
        merged.extend(pick(instance).clone());
        merged.retain(|_, value| !value.is_empty());
        merged
    }
}

// ──────────────────── init protocol ────────────────────

/// Result of attaching an instance to its templates.
#[derive(Debug)]
pub struct Attached<T> {
    /// Declared type, own or inherited from the main template.
    pub effective_type: String,
    pub chain: OverrideChain<T>,
}

/// Attach an instance whose defaults are keyed by type (notifiers).
///
/// Ensures `mains[key]`, `defaults[type]` and `hard_defaults[type]` exist,
/// clears the instance's type when it merely repeats its main's, and
/// normalises every layer involved.
pub fn attach_typed<T: Layer>(
    key: &str,
    instance: &mut T,
    mains: &mut TemplateSet<T>,
    defaults: &mut TemplateSet<T>,
    hard_defaults: &mut TemplateSet<T>,
) -> Attached<T> {
    let main = mains.ensure(key);
    let effective_type = effective_type(instance, &main);
    let defaults = defaults.ensure(&effective_type);
    let hard_defaults = hard_defaults.ensure(&effective_type);
    finish_attach(instance, main, defaults, hard_defaults, effective_type)
}

/// Attach an instance whose defaults are shared by every type (webhooks).
pub fn attach_shared<T: Layer>(
    key: &str,
    instance: &mut T,
    mains: &mut TemplateSet<T>,
    defaults: &Template<T>,
    hard_defaults: &Template<T>,
) -> Attached<T> {
    let main = mains.ensure(key);
    let effective_type = effective_type(instance, &main);
    finish_attach(
        instance,
        main,
        defaults.clone(),
        hard_defaults.clone(),
        effective_type,
    )
}

fn effective_type<T: Layer>(instance: &T, main: &Template<T>) -> String {
    let main_type = main.read().declared_type().to_string();
    first_present([instance.declared_type().to_string(), main_type]).unwrap_or_default()
}

fn finish_attach<T: Layer>(
    instance: &mut T,
    main: Template<T>,
    defaults: Template<T>,
    hard_defaults: Template<T>,
    effective_type: String,
) -> Attached<T> {
    if instance.declared_type() == main.read().declared_type() {
        instance.clear_type();
    }
    instance.normalize();
    main.write().normalize();
    defaults.write().normalize();
    hard_defaults.write().normalize();
    Attached {
        effective_type,
        chain: OverrideChain::new(Some(main), defaults, hard_defaults),
    }
}
