//! Two-tier progress log.
//!
//! The log keeps reusable learnings in a patterns block, which is always
//! loaded in full, and appends one dated entry per story execution. Only the
//! newest entries are loaded back into prompts; older ones stay on disk.
//!
//! - [`entry`] - structured reader for the file
//! - [`health`] - the `vralph health` report

pub mod entry;
pub mod health;

pub use entry::{ProgressDocument, ProgressEntry, PATTERNS_HEADER, RECORD_TERMINATOR};
pub use health::ProgressHealth;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::error::Result;
use crate::prompt::templates::{write_default, WriteStatus};

/// Learnings handed to the coder prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressContext {
    pub patterns: Vec<String>,
    pub recent_history: Vec<ProgressEntry>,
}

impl ProgressContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.recent_history.is_empty()
    }

    /// Render for the `{{learnings}}` marker. Empty when there is nothing.
    #[must_use]
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if !self.patterns.is_empty() {
            let bullets: Vec<String> = self.patterns.iter().map(|p| format!("- {p}")).collect();
            sections.push(format!("{PATTERNS_HEADER}\n{}", bullets.join("\n")));
        }
        if !self.recent_history.is_empty() {
            let entries: Vec<String> = self.recent_history.iter().map(ProgressEntry::to_text).collect();
            sections.push(format!("## Recent History\n\n{}", entries.join("\n\n")));
        }
        sections.join("\n\n")
    }
}

/// Template for a new progress file.
#[must_use]
pub fn progress_template() -> String {
    format!(
        "# Ralph Progress Log\nStarted: {}\n\n{PATTERNS_HEADER}\n{RECORD_TERMINATOR}\n\n## Recent History\n{RECORD_TERMINATOR}\n",
        Local::now().format("%a %b %d %H:%M:%S %Y")
    )
}

/// A progress file on disk.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file from the template if missing. Returns true if created.
    pub fn ensure_exists(&self) -> Result<bool> {
        Ok(write_default(&self.path, &progress_template(), false)? == WriteStatus::Created)
    }

    /// Write the template, replacing an existing file only with `force`.
    pub fn write_template(&self, force: bool) -> Result<WriteStatus> {
        write_default(&self.path, &progress_template(), force)
    }

    /// Read the whole file into a document.
    pub fn read(&self) -> Result<ProgressDocument> {
        self.ensure_exists()?;
        let content = fs::read_to_string(&self.path)?;
        Ok(ProgressDocument::parse(&content))
    }

    /// Patterns in full plus the last `max_history` entries.
    pub fn load(&self, max_history: usize) -> Result<ProgressContext> {
        let doc = self.read()?;
        let recent = doc.recent_entries(max_history).to_vec();
        debug!(
            patterns = doc.patterns.len(),
            entries = doc.entries.len(),
            loaded = recent.len(),
            "Loaded progress log"
        );
        Ok(ProgressContext {
            patterns: doc.patterns,
            recent_history: recent,
        })
    }

    /// Append one block, adding the terminator if the text lacks it.
    pub fn append(&self, entry: &str) -> Result<()> {
        self.ensure_exists()?;
        let existing = fs::read_to_string(&self.path)?;

        let mut entry = entry.trim().to_string();
        if !entry.ends_with(RECORD_TERMINATOR) {
            entry.push('\n');
            entry.push_str(RECORD_TERMINATOR);
        }

        let separator = if existing.is_empty() || existing.ends_with('\n') {
            "\n"
        } else {
            "\n\n"
        };

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{separator}{entry}")?;
        file.sync_all()?;
        Ok(())
    }

    pub fn append_entry(&self, entry: &ProgressEntry) -> Result<()> {
        self.append(&entry.to_text())
    }
}
