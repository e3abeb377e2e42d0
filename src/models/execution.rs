use std::collections::VecDeque;

use serde::{Deserialize, Serialize, Serializer};

use super::session::Language;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Output of one run of a session's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds, never negative.
    pub execution_time: f64,
    pub language: Language,
}

/// Most recent execution results, newest first.
///
/// Backed by a `VecDeque` so that recording a result when full drops the
/// oldest entry in constant time.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: VecDeque<ExecutionResult>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a result, returning the evicted oldest entry if the buffer was full.
    pub fn record(&mut self, result: ExecutionResult) -> Option<ExecutionResult> {
        if self.capacity == 0 {
            return Some(result);
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_back()
        } else {
            None
        };
        self.entries.push_front(result);
        evicted
    }

    pub fn latest(&self) -> Option<&ExecutionResult> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.entries.iter()
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    pub fn to_vec(&self) -> Vec<ExecutionResult> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Serialize for ExecutionHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}
