//! PRD (product requirements document) model and persistence.
//!
//! The PRD is read once when a run starts and rewritten once per terminal
//! story outcome. Fields the model does not know about are carried through
//! a rewrite untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, VRalphError};

/// Notes prefix marking a story the runner must never pick again.
pub const SKIPPED_PREFIX: &str = "Skipped:";

/// Context window size used for story size indicators.
pub const CONTEXT_WINDOW_TOKENS: usize = 100_000;

/// Fraction of the context window at which a story is flagged LARGE.
pub const TOKEN_WARNING_RATIO: f64 = 0.5;

/// Fraction of the context window at which a story is flagged TOO LARGE.
pub const TOKEN_ERROR_RATIO: f64 = 0.8;

const TMP_SUFFIX: &str = ".tmp";

/// Rough token count for free text: words x 1.3.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3) as usize
}

/// Shell commands that verify the project after each coder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCommands {
    #[serde(default)]
    pub typecheck: String,
    #[serde(default)]
    pub test: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerificationCommands {
    /// Non-empty commands joined with ` && `; empty when none are set.
    #[must_use]
    pub fn combined(&self) -> String {
        [self.typecheck.trim(), self.test.trim()]
            .into_iter()
            .filter(|cmd| !cmd.is_empty())
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// A single unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub passes: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_whitelist: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Story size relative to the agent's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeIndicator {
    Normal,
    Large,
    TooLarge,
}

impl SizeIndicator {
    #[must_use]
    pub fn for_tokens(tokens: usize) -> Self {
        let ratio = tokens as f64 / CONTEXT_WINDOW_TOKENS as f64;
        if ratio >= TOKEN_ERROR_RATIO {
            Self::TooLarge
        } else if ratio >= TOKEN_WARNING_RATIO {
            Self::Large
        } else {
            Self::Normal
        }
    }

    /// Label shown next to the estimate; empty for normal stories.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Large => "\u{26a0} LARGE",
            Self::TooLarge => "\u{26a0} TOO LARGE",
        }
    }
}

impl Story {
    /// Create a story with the required fields; everything else defaults.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: Vec::new(),
            priority: 0,
            passes: false,
            notes: String::new(),
            attempts: 0,
            files_whitelist: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_whitelist<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files_whitelist = Some(files.into_iter().map(Into::into).collect());
        self
    }

    /// True if the story was skipped (escalated or manually parked).
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.notes.starts_with(SKIPPED_PREFIX)
    }

    /// True if the story still needs work.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.passes && !self.is_skipped()
    }

    /// Estimated prompt tokens for this story's own text.
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        let mut parts: Vec<&str> = vec![&self.title, &self.description];
        parts.extend(self.acceptance_criteria.iter().map(String::as_str));
        if let Some(files) = &self.files_whitelist {
            parts.extend(files.iter().map(String::as_str));
        }
        estimate_tokens(&parts.join(" "))
    }
}

/// The whole PRD file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub verification_commands: VerificationCommands,
    #[serde(default)]
    pub user_stories: Vec<Story>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Prd {
    /// Load a PRD from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VRalphError::PrdNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        let prd: Prd = serde_json::from_str(&content).map_err(|e| VRalphError::InvalidPrd {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            path = %path.display(),
            stories = prd.user_stories.len(),
            "Loaded PRD"
        );
        Ok(prd)
    }

    /// Write the PRD as pretty JSON with a trailing newline, atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let tmp_path = tmp_path_for(path);
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        tracing::debug!(path = %path.display(), "Saved PRD");
        Ok(())
    }

    /// Pending stories in ascending priority order.
    #[must_use]
    pub fn pending_stories(&self) -> Vec<&Story> {
        let mut pending: Vec<&Story> = self.user_stories.iter().filter(|s| s.is_pending()).collect();
        pending.sort_by_key(|s| s.priority);
        pending
    }

    /// The highest-priority pending story.
    #[must_use]
    pub fn next_pending(&self) -> Option<&Story> {
        self.pending_stories().into_iter().next()
    }

    /// Look up a story by id.
    pub fn find_story(&self, id: &str) -> Result<&Story> {
        self.user_stories
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| VRalphError::StoryNotFound {
                story_id: id.to_string(),
                available: self.story_ids(),
            })
    }

    #[must_use]
    pub fn story_ids(&self) -> Vec<String> {
        self.user_stories.iter().map(|s| s.id.clone()).collect()
    }

    fn story_mut(&mut self, id: &str) -> Result<&mut Story> {
        let available = self.story_ids();
        self.user_stories
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| VRalphError::StoryNotFound {
                story_id: id.to_string(),
                available,
            })
    }

    pub fn mark_passed(&mut self, id: &str) -> Result<()> {
        self.story_mut(id)?.passes = true;
        Ok(())
    }

    /// Bump the attempt counter and return the new value.
    pub fn increment_attempts(&mut self, id: &str) -> Result<u32> {
        let story = self.story_mut(id)?;
        story.attempts += 1;
        Ok(story.attempts)
    }

    /// Park a story so it is never picked again.
    pub fn mark_skipped(&mut self, id: &str, reason: &str) -> Result<()> {
        self.story_mut(id)?.notes = format!("{SKIPPED_PREFIX} {reason}");
        Ok(())
    }

    /// (total, passed, pending, skipped)
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let total = self.user_stories.len();
        let passed = self.user_stories.iter().filter(|s| s.passes).count();
        let skipped = self
            .user_stories
            .iter()
            .filter(|s| !s.passes && s.is_skipped())
            .count();
        (total, passed, total - passed - skipped, skipped)
    }

    /// Stories ordered pending-first, then by priority.
    #[must_use]
    pub fn stories_for_status(&self) -> Vec<&Story> {
        let mut stories: Vec<&Story> = self.user_stories.iter().collect();
        stories.sort_by_key(|s| (!s.is_pending(), s.priority));
        stories
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "prd.json".into());
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
  "project": "demo",
  "branchName": "feature/demo",
  "description": "Demo project",
  "verificationCommands": { "typecheck": "mypy .", "test": "pytest" },
  "owner": "platform-team",
  "userStories": [
    { "id": "US-002", "title": "Second", "description": "b", "priority": 2 },
    { "id": "US-001", "title": "First", "description": "a", "priority": 1,
      "acceptanceCriteria": ["works"], "filesWhitelist": ["a.py"], "estimate": 3 },
    { "id": "US-003", "title": "Done", "description": "c", "priority": 0, "passes": true },
    { "id": "US-004", "title": "Parked", "description": "d", "priority": 0,
      "notes": "Skipped: escalated - unclear requirement" }
  ]
}"#;

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("prd.json");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    // =========================================================================
    // Load / save
    // =========================================================================

    #[test]
    fn test_load_sample() {
        let temp = TempDir::new().unwrap();
        let prd = Prd::load(&write_sample(temp.path())).unwrap();

        assert_eq!(prd.project, "demo");
        assert_eq!(prd.branch_name, "feature/demo");
        assert_eq!(prd.user_stories.len(), 4);
        let first = prd.find_story("US-001").unwrap();
        assert_eq!(first.acceptance_criteria, vec!["works"]);
        assert_eq!(first.files_whitelist, Some(vec!["a.py".to_string()]));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Prd::load(&temp.path().join("prd.json")).unwrap_err();
        assert!(matches!(err, VRalphError::PrdNotFound { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prd.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            Prd::load(&path).unwrap_err(),
            VRalphError::InvalidPrd { .. }
        ));
    }

    #[test]
    fn test_load_missing_required_story_field() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prd.json");
        fs::write(&path, r#"{"userStories": [{"id": "US-1", "title": "t"}]}"#).unwrap();
        let err = Prd::load(&path).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_save_preserves_unknown_fields() {
        let temp = TempDir::new().unwrap();
        let path = write_sample(temp.path());
        let mut prd = Prd::load(&path).unwrap();
        prd.mark_passed("US-001").unwrap();
        prd.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert!(!tmp_path_for(&path).exists());

        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["owner"], "platform-team");
        assert_eq!(value["userStories"][1]["estimate"], 3);
        assert_eq!(value["userStories"][1]["passes"], true);
        assert!(value["userStories"][0].get("filesWhitelist").is_none());
    }

    // =========================================================================
    // Queries and mutations
    // =========================================================================

    #[test]
    fn test_pending_sorted_by_priority_excluding_skipped() {
        let temp = TempDir::new().unwrap();
        let prd = Prd::load(&write_sample(temp.path())).unwrap();
        let ids: Vec<&str> = prd.pending_stories().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["US-001", "US-002"]);
        assert_eq!(prd.next_pending().unwrap().id, "US-001");
    }

    #[test]
    fn test_find_story_lists_available() {
        let temp = TempDir::new().unwrap();
        let prd = Prd::load(&write_sample(temp.path())).unwrap();
        match prd.find_story("US-999").unwrap_err() {
            VRalphError::StoryNotFound { available, .. } => assert_eq!(available.len(), 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mutations() {
        let temp = TempDir::new().unwrap();
        let mut prd = Prd::load(&write_sample(temp.path())).unwrap();

        assert_eq!(prd.increment_attempts("US-002").unwrap(), 1);
        assert_eq!(prd.increment_attempts("US-002").unwrap(), 2);
        prd.mark_skipped("US-002", "escalated - needs design").unwrap();

        let story = prd.find_story("US-002").unwrap();
        assert_eq!(story.notes, "Skipped: escalated - needs design");
        assert!(!story.is_pending());
        assert!(prd.mark_passed("nope").is_err());
    }

    #[test]
    fn test_counts_and_status_order() {
        let temp = TempDir::new().unwrap();
        let prd = Prd::load(&write_sample(temp.path())).unwrap();
        assert_eq!(prd.counts(), (4, 1, 2, 1));

        let order: Vec<&str> = prd
            .stories_for_status()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["US-001", "US-002", "US-003", "US-004"]);
    }

    #[test]
    fn test_combined_verification_commands() {
        let commands = VerificationCommands {
            typecheck: "mypy .".to_string(),
            test: "pytest".to_string(),
            ..Default::default()
        };
        assert_eq!(commands.combined(), "mypy . && pytest");

        let only_test = VerificationCommands {
            test: "cargo test".to_string(),
            ..Default::default()
        };
        assert_eq!(only_test.combined(), "cargo test");
        assert_eq!(VerificationCommands::default().combined(), "");
    }

    // =========================================================================
    // Token estimates
    // =========================================================================

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }

    #[test]
    fn test_story_estimate_includes_criteria_and_whitelist() {
        let story = Story::new("US-1", "Add login", "Users sign in")
            .with_criteria(["form renders"])
            .with_whitelist(["login.py"]);
        // 2 + 3 + 2 + 1 words
        assert_eq!(story.estimate_tokens(), (8.0 * 1.3) as usize);
    }

    #[test]
    fn test_size_indicator_thresholds() {
        assert_eq!(SizeIndicator::for_tokens(49_999), SizeIndicator::Normal);
        assert_eq!(SizeIndicator::for_tokens(50_000), SizeIndicator::Large);
        assert_eq!(SizeIndicator::for_tokens(80_000), SizeIndicator::TooLarge);
        assert_eq!(SizeIndicator::Normal.label(), "");
    }
}
