//! User-facing output.
//!
//! Components never print directly. They receive an [`OutputSink`] and report
//! through it, so the console rendering can be swapped for a recorder in
//! tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Destination for progress messages shown to the user.
pub trait OutputSink: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);

    /// Section title.
    fn header(&self, message: &str) {
        self.info(message);
    }

    /// Show an activity indicator until [`OutputSink::stop_spinner`].
    fn start_spinner(&self, _message: &str) {}

    fn stop_spinner(&self) {}
}

const SPINNER_TICK: Duration = Duration::from_millis(100);

/// Colored terminal output with an optional spinner.
///
/// The spinner ticks on indicatif's background thread; the only state it
/// shares with the caller is the bar handle.
#[derive(Default)]
pub struct ConsoleOutput {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Print through the spinner when one is active so lines don't tear.
    fn emit(&self, line: String, to_stderr: bool) {
        let guard = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(bar) => bar.suspend(|| print_line(&line, to_stderr)),
            None => print_line(&line, to_stderr),
        }
    }
}

fn print_line(line: &str, to_stderr: bool) {
    if to_stderr {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

impl OutputSink for ConsoleOutput {
    fn success(&self, message: &str) {
        self.emit(message.green().to_string(), false);
    }

    fn error(&self, message: &str) {
        self.emit(message.red().to_string(), true);
    }

    fn warning(&self, message: &str) {
        self.emit(message.yellow().to_string(), false);
    }

    fn info(&self, message: &str) {
        self.emit(message.to_string(), false);
    }

    fn header(&self, message: &str) {
        self.emit(message.bold().to_string(), false);
    }

    fn start_spinner(&self, message: &str) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(SPINNER_TICK);

        let mut guard = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn stop_spinner(&self) {
        let mut guard = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}

/// Shorten `text` to at most `max` characters, marking the cut.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("  all good \n", 50), "all good");
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("\u{2713}\u{2713}\u{2713}", 2), "\u{2713}\u{2713}...");
    }

    #[test]
    fn test_spinner_start_stop_is_idempotent() {
        let console = ConsoleOutput::new();
        console.stop_spinner();
        console.start_spinner("working");
        console.start_spinner("still working");
        console.info("line while spinning");
        console.stop_spinner();
        console.stop_spinner();
        assert!(console.spinner.lock().unwrap().is_none());
    }
}
