//! Bounded per-operation log of retry activity.
//!
//! Advisory only: it exists so operators (and the CLI) can inspect why a
//! pipeline step took as long as it did.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Entries kept per operation before the oldest is dropped.
pub const MAX_ENTRIES_PER_OPERATION: usize = 100;

/// Operations tracked before the least recently created one is dropped.
pub const MAX_OPERATIONS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub wait_secs: f64,
    pub message: String,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, VecDeque<LogEntry>>,
    // Creation order, for evicting whole operations
    order: VecDeque<String>,
}

#[derive(Debug, Default)]
pub struct OperationLog {
    inner: Mutex<Inner>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op_id: &str, attempt: u32, wait: Duration, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            attempt,
            wait_secs: wait.as_secs_f64(),
            message: message.into(),
        };

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(op_id) {
            if inner.order.len() >= MAX_OPERATIONS {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
            inner.order.push_back(op_id.to_string());
        }

        let log = inner.entries.entry(op_id.to_string()).or_default();
        if log.len() >= MAX_ENTRIES_PER_OPERATION {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Entries for one operation, oldest first.
    pub fn entries(&self, op_id: &str) -> Vec<LogEntry> {
        self.inner
            .lock()
            .entries
            .get(op_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().order.iter().cloned().collect()
    }

    pub fn clear(&self, op_id: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(op_id);
        inner.order.retain(|id| id != op_id);
    }
}
