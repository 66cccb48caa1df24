//! Health report for the progress log.

use std::fs;
use std::path::Path;

use crate::config::validation::ValidationCheck;
use crate::prd::estimate_tokens;

use super::entry::ProgressDocument;

/// Patterns block size that starts to crowd the prompt.
pub const PATTERNS_TOKEN_WARNING_THRESHOLD: usize = 2000;

/// History length past which old entries should be pruned.
pub const HISTORY_ENTRY_WARNING_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressHealth {
    pub exists: bool,
    pub has_patterns_section: bool,
    pub patterns_count: usize,
    pub patterns_tokens: usize,
    pub history_count: usize,
    pub parse_errors: Vec<String>,
    pub total_tokens: usize,
}

impl ProgressHealth {
    /// Inspect `path` without creating it.
    #[must_use]
    pub fn check(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                return Self {
                    exists: true,
                    parse_errors: vec![format!("Could not read file: {e}")],
                    ..Self::default()
                }
            }
        };
        Self::from_content(&content)
    }

    #[must_use]
    pub fn from_content(content: &str) -> Self {
        let doc = ProgressDocument::parse(content);
        Self {
            exists: true,
            has_patterns_section: doc.has_patterns_section,
            patterns_count: doc.patterns.len(),
            patterns_tokens: estimate_tokens(&doc.pattern_lines.join("\n")),
            history_count: doc.entries.iter().filter(|e| e.story_id.is_some()).count(),
            parse_errors: doc.parse_errors,
            total_tokens: estimate_tokens(content),
        }
    }

    #[must_use]
    pub fn history_parseable(&self) -> bool {
        self.parse_errors.is_empty()
    }

    /// Pass/fail checks. Only the existence check is reported when the file
    /// is missing.
    #[must_use]
    pub fn checks(&self, path: &Path) -> Vec<ValidationCheck> {
        if !self.exists {
            return vec![ValidationCheck::fail(
                "File exists",
                format!("Not found at {}", path.display()),
            )];
        }

        let mut checks = vec![ValidationCheck::pass(
            "File exists",
            format!("Found at {}", path.display()),
        )];
        checks.push(if self.has_patterns_section {
            ValidationCheck::pass("Patterns section present", "Codebase Patterns section found")
        } else {
            ValidationCheck::fail("Patterns section present", "No Codebase Patterns section")
        });
        checks.push(if self.history_parseable() {
            ValidationCheck::pass(
                "History parseable",
                format!("Found {} history entries", self.history_count),
            )
        } else {
            ValidationCheck::fail(
                "History parseable",
                format!("{} parse error(s)", self.parse_errors.len()),
            )
        });
        checks
    }

    /// Size warnings; these never fail the check.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.patterns_tokens > PATTERNS_TOKEN_WARNING_THRESHOLD {
            warnings.push(format!(
                "Patterns section has {} tokens (threshold: {PATTERNS_TOKEN_WARNING_THRESHOLD})",
                self.patterns_tokens
            ));
        }
        if self.history_count > HISTORY_ENTRY_WARNING_THRESHOLD {
            warnings.push(format!(
                "History has {} entries (threshold: {HISTORY_ENTRY_WARNING_THRESHOLD})",
                self.history_count
            ));
        }
        warnings
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.exists && self.has_patterns_section && self.history_parseable()
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_healthy() {
            0
        } else {
            1
        }
    }
}
