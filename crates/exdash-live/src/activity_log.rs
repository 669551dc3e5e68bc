/*
[INPUT]:  Text lines from the live manager and its collaborators
[OUTPUT]: Bounded, most-recent-first operator log
[POS]:    Live layer - observational log sink (no control logic)
[UPDATE]: When changing log retention or line format
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use tracing::info;

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub text: String,
}

impl LogLine {
    /// `[HH:MM:SS] text`
    pub fn render(&self) -> String {
        format!("[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }
}

/// Shared append-only activity log. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn append(&self, text: impl Into<String>) {
        let line = LogLine {
            at: Local::now(),
            text: text.into(),
        };
        info!(target: "exdash_live::activity", "{}", line.text);

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push_front(line);
        lines.truncate(self.capacity);
    }

    /// Newest first
    pub fn lines(&self) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }

    /// Newest first, text only
    pub fn texts(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().map(|line| line.text.clone()).collect()
    }

    pub fn latest(&self) -> Option<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
