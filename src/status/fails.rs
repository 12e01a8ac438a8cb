//! Per-unit delivery failure bookkeeping.
//!
//! Each domain has its own lock so that recording a webhook outcome never
//! waits on a reader of the notifier flags.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

/// Outcome of the last attempt of one action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailState {
    /// Not attempted since the last reset.
    #[default]
    Unknown,
    Failed,
    Succeeded,
}

impl FailState {
    #[must_use]
    pub const fn from_ok(ok: bool) -> Self {
        if ok { Self::Succeeded } else { Self::Failed }
    }

    /// Needs (re-)running: failed or never attempted.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for FailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "nil",
            Self::Failed => "true",
            Self::Succeeded => "false",
        })
    }
}

/// Name-keyed flags (notifiers, webhooks).
#[derive(Debug, Default)]
pub struct FailMap {
    states: RwLock<BTreeMap<String, FailState>>,
}

impl FailMap {
    /// Start with every name `Unknown`.
    pub fn init<S: AsRef<str>>(&self, names: impl IntoIterator<Item = S>) {
        let mut states = self.states.write();
        states.clear();
        for name in names {
            states.insert(name.as_ref().to_string(), FailState::Unknown);
        }
    }

    pub fn set(&self, name: &str, state: FailState) {
        self.states.write().insert(name.to_string(), state);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> FailState {
        self.states.read().get(name).copied().unwrap_or_default()
    }

    pub fn reset(&self) {
        for state in self.states.write().values_mut() {
            *state = FailState::Unknown;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// `true` when every entry succeeded (vacuously true when empty).
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.states
            .read()
            .values()
            .all(|s| *s == FailState::Succeeded)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, FailState> {
        self.states.read().clone()
    }
}

impl fmt::Display for FailMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states = self.states.read();
        f.write_str("{")?;
        for (i, (name, state)) in states.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {state}")?;
        }
        f.write_str("}")
    }
}

/// Index-keyed flags (commands).
#[derive(Debug, Default)]
pub struct FailList {
    states: RwLock<Vec<FailState>>,
}

impl FailList {
    pub fn init(&self, len: usize) {
        *self.states.write() = vec![FailState::Unknown; len];
    }

    /// Out-of-range indices are ignored.
    pub fn set(&self, index: usize, state: FailState) {
        if let Some(slot) = self.states.write().get_mut(index) {
            *slot = state;
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> FailState {
        self.states.read().get(index).copied().unwrap_or_default()
    }

    pub fn reset(&self) {
        self.states.write().fill(FailState::Unknown);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.states.read().iter().all(|s| *s == FailState::Succeeded)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<FailState> {
        self.states.read().clone()
    }
}

impl fmt::Display for FailList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states = self.states.read();
        f.write_str("[")?;
        for (i, state) in states.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{i}: {state}")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Default)]
pub struct Fails {
    pub notify: FailMap,
    pub command: FailList,
    pub webhook: FailMap,
}

impl Fails {
    pub fn init<N, W>(&self, notify: N, commands: usize, webhooks: W)
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        self.notify.init(notify);
        self.command.init(commands);
        self.webhook.init(webhooks);
    }

    /// Forget every outcome. Sizes are kept.
    pub fn reset(&self) {
        self.notify.reset();
        self.command.reset();
        self.webhook.reset();
    }

    #[must_use]
    pub fn snapshot(&self) -> FailsSnapshot {
        FailsSnapshot {
            notify: self.notify.snapshot(),
            command: self.command.snapshot(),
            webhook: self.webhook.snapshot(),
        }
    }
}

impl fmt::Display for Fails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.notify.is_empty() {
            parts.push(format!("notify: {}", self.notify));
        }
        if !self.command.is_empty() {
            parts.push(format!("command: {}", self.command));
        }
        if !self.webhook.is_empty() {
            parts.push(format!("webhook: {}", self.webhook));
        }
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailsSnapshot {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub notify: BTreeMap<String, FailState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<FailState>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub webhook: BTreeMap<String, FailState>,
}
