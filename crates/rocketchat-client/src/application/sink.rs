//! Output port for rendered command results.
//!
//! Commands never print directly.  They hand each line to a [`TextSink`]
//! together with an optional *target*, the name of the conversation the line
//! belongs to.  The binary plugs in a stdout sink; tests plug in
//! [`RecordingSink`] and inspect what would have been shown.

use std::sync::{Mutex, PoisonError};

/// Somewhere rendered lines go.
pub trait TextSink: Send + Sync {
    /// Shows `line`, in the window for `target` when one is given.
    fn print(&self, target: Option<&str>, line: &str);
}

/// A sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Option<String>, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(target, line)` printed so far, oldest first.
    pub fn lines(&self) -> Vec<(Option<String>, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Just the text of every line printed so far.
    pub fn texts(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, line)| line).collect()
    }
}

impl TextSink for RecordingSink {
    fn print(&self, target: Option<&str>, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target.map(str::to_owned), line.to_owned()));
    }
}
