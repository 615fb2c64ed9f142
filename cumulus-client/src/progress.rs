//! Per-file transfer progress
//!
//! Orchestrators advance an entry as pieces complete; anyone holding a clone
//! of the registry can read it while transfers are in flight.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Progress of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: u64,
    pub done: u64,
    pub finished: bool,
}

impl Progress {
    /// Completed fraction in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.finished || self.total == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }
        (self.done as f64 / self.total as f64).min(1.0)
    }
}

/// Shared map from transfer key (usually the file hash) to progress
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    entries: Arc<RwLock<HashMap<String, Progress>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key`, resetting any previous entry
    pub fn begin(&self, key: &str, total: u64) {
        self.entries.write().insert(
            key.to_string(),
            Progress {
                total,
                done: 0,
                finished: false,
            },
        );
    }

    /// Start tracking `key` for the lifetime of the returned guard
    pub fn track(&self, key: &str, total: u64) -> ProgressGuard {
        self.begin(key, total);
        ProgressGuard {
            registry: self.clone(),
            key: key.to_string(),
        }
    }

    pub fn advance(&self, key: &str, bytes: u64) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.done = entry.done.saturating_add(bytes);
        }
    }

    pub fn finish(&self, key: &str) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.done = entry.done.max(entry.total);
            entry.finished = true;
        }
    }

    /// Fraction done, or `None` when `key` was never started
    pub fn fraction(&self, key: &str) -> Option<f64> {
        self.entries.read().get(key).map(Progress::fraction)
    }

    pub fn get(&self, key: &str) -> Option<Progress> {
        self.entries.read().get(key).copied()
    }

    /// Progress of several keys at once; unknown keys are skipped
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<(String, Progress)> {
        let entries = self.entries.read();
        keys.into_iter()
            .filter_map(|key| entries.get(key).map(|p| (key.to_string(), *p)))
            .collect()
    }

    pub fn remove(&self, key: &str) -> Option<Progress> {
        self.entries.write().remove(key)
    }
}

/// Removes its entry from the registry when dropped
#[derive(Debug)]
pub struct ProgressGuard {
    registry: ProgressRegistry,
    key: String,
}

impl ProgressGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}
