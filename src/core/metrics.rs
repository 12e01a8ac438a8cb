//! Labelled counters, passed explicitly to every component that reports.
//!
//! A counter must be registered before it counts. Only entities attached to a
//! unit register theirs, so template-only definitions never add series.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

pub const NOTIFY_RESULT: &str = "notify_result";
pub const WEBHOOK_RESULT: &str = "webhook_result";
pub const COMMAND_RESULT: &str = "command_result";
pub const LATEST_VERSION_QUERY: &str = "latest_version_query";

/// Outcome label shared by every result counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fail,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
        }
    }

    #[must_use]
    pub const fn from_ok(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Fail }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub name: &'static str,
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &'static str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        labels.sort();
        Self { name, labels }
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    series: Mutex<BTreeMap<SeriesKey, u64>>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed series. Re-registering keeps the current count.
    pub fn register(&self, name: &'static str, labels: &[(&str, &str)]) {
        self.series
            .lock()
            .entry(SeriesKey::new(name, labels))
            .or_insert(0);
    }

    /// Register the SUCCESS and FAIL series of a result counter.
    pub fn register_result(&self, name: &'static str, labels: &[(&str, &str)]) {
        for outcome in [Outcome::Success, Outcome::Fail] {
            let mut all = labels.to_vec();
            all.push(("result", outcome.as_str()));
            self.register(name, &all);
        }
    }

    /// Increment a registered series. Unregistered series are ignored.
    pub fn inc(&self, name: &'static str, labels: &[(&str, &str)]) {
        if let Some(count) = self.series.lock().get_mut(&SeriesKey::new(name, labels)) {
            *count += 1;
        }
    }

    pub fn inc_result(&self, name: &'static str, labels: &[(&str, &str)], outcome: Outcome) {
        let mut all = labels.to_vec();
        all.push(("result", outcome.as_str()));
        self.inc(name, &all);
    }

    #[must_use]
    pub fn get(&self, name: &'static str, labels: &[(&str, &str)]) -> Option<u64> {
        self.series
            .lock()
            .get(&SeriesKey::new(name, labels))
            .copied()
    }

    pub fn remove_series(&self, name: &'static str, labels: &[(&str, &str)]) -> bool {
        self.series
            .lock()
            .remove(&SeriesKey::new(name, labels))
            .is_some()
    }

    /// Drop every series whose `label` equals `value`.
    pub fn remove_where(&self, label: &str, value: &str) -> usize {
        let mut series = self.series.lock();
        let before = series.len();
        series.retain(|key, _| key.label(label) != Some(value));
        before - series.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.lock().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<(SeriesKey, u64)> {
        self.series
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
