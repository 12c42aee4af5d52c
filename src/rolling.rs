//! Recency window over recorded hits.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone)]
struct LogEntry {
    key: String,
    at: DateTime<Utc>,
}

/// Keeps keys seen within the last `keep_for`, discarding older ones on access.
#[derive(Debug, Clone)]
pub struct RollingLog {
    entries: VecDeque<LogEntry>,
    keep_for: Duration,
}

impl RollingLog {
    pub fn new(keep_for: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            keep_for,
        }
    }

    pub fn add_entry(&mut self, key: &str) {
        self.add_entry_at(key, Utc::now());
    }

    /// Entries must be added in non-decreasing time order.
    pub fn add_entry_at(&mut self, key: &str, at: DateTime<Utc>) {
        self.trim(at);
        self.entries.push_back(LogEntry {
            key: key.to_string(),
            at,
        });
    }

    /// Per-key counts inside the window ending now.
    pub fn counts(&mut self) -> BTreeMap<String, usize> {
        self.counts_at(Utc::now())
    }

    pub fn counts_at(&mut self, now: DateTime<Utc>) -> BTreeMap<String, usize> {
        self.trim(now);
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.key.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.keep_for;
        while self.entries.front().is_some_and(|entry| entry.at < cutoff) {
            self.entries.pop_front();
        }
    }
}
