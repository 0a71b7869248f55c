use super::result::Output;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HistoryKey {
    scanner: String,
    host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub output: Output,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct History {
    entries: Mutex<HashMap<HistoryKey, Vec<HistoryEntry>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<HistoryKey, Vec<HistoryEntry>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(scanner: &str, host: &str) -> HistoryKey {
        HistoryKey {
            scanner: scanner.to_string(),
            host: host.to_string(),
        }
    }

    pub fn record(&self, scanner: &str, host: &str, output: Output) {
        self.entries()
            .entry(Self::key(scanner, host))
            .or_default()
            .push(HistoryEntry {
                output,
                recorded_at: Utc::now(),
            });
    }

    pub fn get_all(&self, scanner: &str, host: &str) -> Option<Vec<Output>> {
        self.entries()
            .get(&Self::key(scanner, host))
            .map(|entries| entries.iter().map(|e| e.output.clone()).collect())
    }

    pub fn get_latest(&self, scanner: &str, host: &str) -> Option<Output> {
        self.entries()
            .get(&Self::key(scanner, host))
            .and_then(|entries| entries.last())
            .map(|e| e.output.clone())
    }

    pub fn entries_for(&self, scanner: &str, host: &str) -> Vec<HistoryEntry> {
        self.entries()
            .get(&Self::key(scanner, host))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, scanner: &str, host: &str) -> usize {
        self.entries()
            .get(&Self::key(scanner, host))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
