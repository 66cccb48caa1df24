//! Structured reader for the progress log.
//!
//! The file is a sequence of blocks, each closed by a `---` line:
//!
//! ```text
//! ## Codebase Patterns
//! - Use pathlib for file paths
//! ---
//!
//! ## 2026-01-28 - US-001
//! Implemented the login form.
//! ---
//! ```
//!
//! [`ProgressDocument::parse`] turns that text into pattern bullets and
//! dated entries, collecting malformed headers instead of failing.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// Closes every block.
pub const RECORD_TERMINATOR: &str = "---";

/// Heading of the patterns block.
pub const PATTERNS_HEADER: &str = "## Codebase Patterns";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn date_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^## (\d{4}-\d{2}-\d{2})(?: - (\S.*))?\s*$").expect("header regex is valid")
    })
}

/// One dated history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub date: NaiveDate,
    /// `None` when the header has a date but no ` - ID` part.
    pub story_id: Option<String>,
    /// Lines between the header and the terminator.
    pub body: String,
}

impl ProgressEntry {
    pub fn new(date: NaiveDate, story_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            date,
            story_id: Some(story_id.into()),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(&self) -> String {
        match &self.story_id {
            Some(id) => format!("## {} - {id}", self.date.format(DATE_FORMAT)),
            None => format!("## {}", self.date.format(DATE_FORMAT)),
        }
    }

    /// Header and body without the terminator.
    #[must_use]
    pub fn to_text(&self) -> String {
        let body = self.body.trim_end();
        if body.is_empty() {
            self.header()
        } else {
            format!("{}\n{body}", self.header())
        }
    }
}

/// Everything read from one progress file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressDocument {
    pub has_patterns_section: bool,
    /// Pattern bullets without the leading `- `.
    pub patterns: Vec<String>,
    /// Non-blank lines of the patterns block.
    pub pattern_lines: Vec<String>,
    pub entries: Vec<ProgressEntry>,
    pub parse_errors: Vec<String>,
}

enum Block {
    Outside,
    Patterns,
    Entry(ProgressEntry),
}

impl ProgressDocument {
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut doc = Self::default();
        let mut block = Block::Outside;

        for (number, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed == RECORD_TERMINATOR {
                doc.close(std::mem::replace(&mut block, Block::Outside));
                continue;
            }

            if trimmed.starts_with("## ") {
                doc.close(std::mem::replace(&mut block, Block::Outside));
                block = doc.open(trimmed, number + 1);
                continue;
            }

            match &mut block {
                Block::Patterns => {
                    if !trimmed.is_empty() {
                        doc.pattern_lines.push(trimmed.to_string());
                    }
                    if let Some(pattern) = trimmed.strip_prefix("- ") {
                        doc.patterns.push(pattern.to_string());
                    }
                }
                Block::Entry(entry) => {
                    if !entry.body.is_empty() {
                        entry.body.push('\n');
                    }
                    entry.body.push_str(line);
                }
                Block::Outside => {}
            }
        }
        doc.close(block);
        doc
    }

    fn open(&mut self, header: &str, line_number: usize) -> Block {
        if header == PATTERNS_HEADER {
            self.has_patterns_section = true;
            return Block::Patterns;
        }
        let Some(caps) = date_header_regex().captures(header) else {
            return Block::Outside;
        };
        let Ok(date) = NaiveDate::parse_from_str(&caps[1], DATE_FORMAT) else {
            self.parse_errors
                .push(format!("Line {line_number}: invalid date in header '{header}'"));
            return Block::Outside;
        };
        let story_id = caps.get(2).map(|m| m.as_str().trim().to_string());
        if story_id.is_none() {
            self.parse_errors.push(format!(
                "Line {line_number}: history header has no story id '{header}'"
            ));
        }
        Block::Entry(ProgressEntry {
            date,
            story_id,
            body: String::new(),
        })
    }

    fn close(&mut self, block: Block) {
        if let Block::Entry(mut entry) = block {
            entry.body = entry.body.trim().to_string();
            self.entries.push(entry);
        }
    }

    /// The last `max` entries, oldest first.
    #[must_use]
    pub fn recent_entries(&self, max: usize) -> &[ProgressEntry] {
        let start = self.entries.len().saturating_sub(max);
        &self.entries[start..]
    }
}
