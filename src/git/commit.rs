//! Whitelist-scoped commit of a finished story.
//!
//! Only whitelisted paths that exist and actually changed are staged; any
//! other dirty file in the working tree is left alone. A commit failure
//! never changes whether the story passed, so every outcome is a value.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::run_git;

/// Revision reported when the commit succeeded but `rev-parse` did not.
pub const UNKNOWN_SHA: &str = "unknown";

/// Why a story commit did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitFailure {
    #[error("No files provided to commit")]
    EmptyWhitelist,

    #[error("No whitelisted files have changes to commit")]
    NoChanges,

    #[error("Failed to stage {path}: {message}")]
    StageFailed { path: String, message: String },

    #[error("Nothing to commit - files may already be committed")]
    NothingToCommit,

    #[error("Commit failed: {message}")]
    CommitFailed { message: String },
}

/// Result of [`commit_whitelisted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        /// Full revision id, or [`UNKNOWN_SHA`].
        sha: String,
        files: Vec<String>,
    },
    Failed(CommitFailure),
}

impl CommitOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub fn sha(&self) -> Option<&str> {
        match self {
            Self::Committed { sha, .. } => Some(sha),
            Self::Failed(_) => None,
        }
    }

    /// Short form of the revision for display.
    #[must_use]
    pub fn short_sha(&self) -> Option<&str> {
        self.sha().map(|sha| sha.get(..8).unwrap_or(sha))
    }
}

/// `feat: {id} - {title}`
#[must_use]
pub fn commit_message(story_id: &str, title: &str) -> String {
    format!("feat: {story_id} - {title}")
}

fn has_output(repo: &Path, args: &[&str]) -> bool {
    match run_git(repo, args) {
        Ok(out) => out.status.success() && !String::from_utf8_lossy(&out.stdout).trim().is_empty(),
        Err(_) => false,
    }
}

/// Paths from `whitelist` that exist and differ from HEAD or are untracked.
fn changed_paths(repo: &Path, whitelist: &[String]) -> Vec<String> {
    whitelist
        .iter()
        .filter(|path| repo.join(path.as_str()).exists())
        .filter(|path| {
            has_output(repo, &["diff", "--name-only", "HEAD", "--", path.as_str()])
                || has_output(
                    repo,
                    &["ls-files", "--others", "--exclude-standard", "--", path.as_str()],
                )
        })
        .cloned()
        .collect()
}

/// Why a `git commit` with a non-zero exit did not commit.
fn classify_commit_failure(stdout: &str, stderr: &str) -> CommitFailure {
    if stdout.to_lowercase().contains("nothing to commit")
        || stderr.to_lowercase().contains("nothing to commit")
    {
        return CommitFailure::NothingToCommit;
    }
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    CommitFailure::CommitFailed {
        message: detail.trim().to_string(),
    }
}

/// Full revision of HEAD, or [`UNKNOWN_SHA`] when `rev-parse` fails.
fn head_revision(repo: &Path) -> String {
    match run_git(repo, &["rev-parse", "HEAD"]) {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => UNKNOWN_SHA.to_string(),
    }
}

/// Stage the changed whitelisted files and commit them.
pub fn commit_whitelisted(
    repo: &Path,
    story_id: &str,
    title: &str,
    whitelist: &[String],
) -> CommitOutcome {
    if whitelist.is_empty() {
        return CommitOutcome::Failed(CommitFailure::EmptyWhitelist);
    }

    let files = changed_paths(repo, whitelist);
    if files.is_empty() {
        debug!(story_id, "No whitelisted file changed");
        return CommitOutcome::Failed(CommitFailure::NoChanges);
    }

    for path in &files {
        let staged = run_git(repo, &["add", "--", path.as_str()]);
        let failure = match staged {
            Ok(out) if out.status.success() => continue,
            Ok(out) => String::from_utf8_lossy(&out.stderr).trim().to_string(),
            Err(e) => e.to_string(),
        };
        warn!(story_id, path = %path, "Failed to stage file");
        return CommitOutcome::Failed(CommitFailure::StageFailed {
            path: path.clone(),
            message: failure,
        });
    }

    let message = commit_message(story_id, title);
    match run_git(repo, &["commit", "-m", message.as_str()]) {
        Ok(out) if out.status.success() => {}
        Ok(out) => {
            return CommitOutcome::Failed(classify_commit_failure(
                &String::from_utf8_lossy(&out.stdout),
                &String::from_utf8_lossy(&out.stderr),
            ));
        }
        Err(e) => {
            return CommitOutcome::Failed(CommitFailure::CommitFailed {
                message: e.to_string(),
            })
        }
    }

    let sha = head_revision(repo);
    if sha == UNKNOWN_SHA {
        warn!(story_id, "Commit succeeded but its revision could not be read");
    }

    info!(story_id, sha = %sha, files = files.len(), "Committed story");
    CommitOutcome::Committed { sha, files }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestFixture;

    fn whitelist(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_commit_message_format() {
        assert_eq!(commit_message("US-001", "Add login"), "feat: US-001 - Add login");
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            CommitFailure::NoChanges.to_string(),
            "No whitelisted files have changes to commit"
        );
        assert_eq!(
            CommitFailure::StageFailed {
                path: "a.py".to_string(),
                message: "denied".to_string()
            }
            .to_string(),
            "Failed to stage a.py: denied"
        );
    }

    #[test]
    fn test_short_sha() {
        let outcome = CommitOutcome::Committed {
            sha: "0123456789abcdef".to_string(),
            files: Vec::new(),
        };
        assert_eq!(outcome.short_sha(), Some("01234567"));

        let unknown = CommitOutcome::Committed {
            sha: UNKNOWN_SHA.to_string(),
            files: Vec::new(),
        };
        assert_eq!(unknown.short_sha(), Some("unknown"));
        assert_eq!(CommitOutcome::Failed(CommitFailure::NoChanges).sha(), None);
    }

    #[test]
    fn test_clean_tree_commit_is_nothing_to_commit() {
        let fixture = TestFixture::with_git_repo();
        let out = run_git(fixture.path(), &["commit", "-m", "empty"]).unwrap();
        assert!(!out.status.success());

        let failure = classify_commit_failure(
            &String::from_utf8_lossy(&out.stdout),
            &String::from_utf8_lossy(&out.stderr),
        );
        assert_eq!(failure, CommitFailure::NothingToCommit);
    }

    #[test]
    fn test_other_commit_failures_keep_git_message() {
        assert_eq!(
            classify_commit_failure("", "fatal: unable to auto-detect email address\n"),
            CommitFailure::CommitFailed {
                message: "fatal: unable to auto-detect email address".to_string()
            }
        );
        assert_eq!(
            classify_commit_failure("hook rejected the commit\n", "  "),
            CommitFailure::CommitFailed {
                message: "hook rejected the commit".to_string()
            }
        );
        assert_eq!(
            classify_commit_failure("", "Nothing to commit"),
            CommitFailure::NothingToCommit
        );
    }

    #[test]
    fn test_head_revision_falls_back_to_unknown() {
        let not_a_repo = tempfile::TempDir::new().unwrap();
        assert_eq!(head_revision(not_a_repo.path()), UNKNOWN_SHA);

        let fixture = TestFixture::with_git_repo();
        let sha = head_revision(fixture.path());
        assert_eq!(sha.len(), 40);
        assert_eq!(sha, fixture.git(&["rev-parse", "HEAD"]).trim());
    }

    #[test]
    fn test_empty_whitelist() {
        let fixture = TestFixture::with_git_repo();
        assert_eq!(
            commit_whitelisted(fixture.path(), "US-1", "t", &[]),
            CommitOutcome::Failed(CommitFailure::EmptyWhitelist)
        );
    }

    #[test]
    fn test_commits_only_changed_whitelisted_file() {
        let fixture = TestFixture::with_git_repo();
        fixture.write_file("a.py", "a = 1\n");
        fixture.write_file("b.py", "b = 1\n");
        fixture.commit_all("add modules");
        let before = fixture.commit_count();

        fixture.write_file("a.py", "a = 2\n");
        fixture.write_file("unrelated.txt", "dirty\n");

        let outcome =
            commit_whitelisted(fixture.path(), "US-007", "Tweak a", &whitelist(&["a.py", "b.py"]));

        match &outcome {
            CommitOutcome::Committed { sha, files } => {
                assert_eq!(files, &vec!["a.py".to_string()]);
                assert_eq!(sha.len(), 40);
            }
            other => panic!("expected commit, got {other:?}"),
        }
        assert_eq!(fixture.commit_count(), before + 1);
        assert_eq!(fixture.git(&["show", "--name-only", "--format=", "HEAD"]).trim(), "a.py");
        assert_eq!(fixture.git(&["log", "-1", "--format=%s"]).trim(), "feat: US-007 - Tweak a");
        assert!(fixture.git(&["status", "--porcelain"]).contains("unrelated.txt"));
    }

    #[test]
    fn test_untracked_whitelisted_file_is_committed() {
        let fixture = TestFixture::with_git_repo();
        fixture.write_file("src/new.py", "print('hi')\n");

        let outcome =
            commit_whitelisted(fixture.path(), "US-2", "New module", &whitelist(&["src/new.py"]));
        assert!(outcome.is_committed());
    }

    #[test]
    fn test_missing_and_unchanged_files_skipped() {
        let fixture = TestFixture::with_git_repo();
        let outcome = commit_whitelisted(
            fixture.path(),
            "US-3",
            "Nothing",
            &whitelist(&["README.md", "does/not/exist.py"]),
        );
        assert_eq!(outcome, CommitOutcome::Failed(CommitFailure::NoChanges));
    }
}
