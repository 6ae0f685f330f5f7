//! Terminal output for command results.

use std::io::Write;

use crate::application::sink::TextSink;

/// Writes each line to standard output.
///
/// Lines with a target are prefixed by it, so history printed for several
/// rooms in one run stays attributable: `[#general] <ann> hi (...)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    /// Formats a line the way [`TextSink::print`] writes it.
    pub fn format(target: Option<&str>, line: &str) -> String {
        match target {
            Some(target) => format!("[{target}] {line}"),
            None => line.to_string(),
        }
    }
}

impl TextSink for StdoutSink {
    fn print(&self, target: Option<&str>, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout (e.g. piped into `head`) is not worth failing a callback over.
        let _ = writeln!(out, "{}", Self::format(target, line));
    }
}
