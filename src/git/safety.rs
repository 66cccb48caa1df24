//! Pre-flight repository checks.
//!
//! All three checks always run, so the user sees every problem at once. A
//! check that cannot be evaluated counts as unsafe.

use std::fmt;

use crate::error::{Result, VRalphError};
use crate::testing::traits::GitOperations;

/// Files listed by name before the message switches to a count.
const MAX_LISTED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyCheckKind {
    UncommittedChanges,
    UnpushedCommits,
    DetachedHead,
}

impl fmt::Display for SafetyCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UncommittedChanges => "uncommitted_changes",
            Self::UnpushedCommits => "unpushed_commits",
            Self::DetachedHead => "detached_head",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSafetyCheck {
    pub kind: SafetyCheckKind,
    pub is_unsafe: bool,
    pub message: String,
}

impl GitSafetyCheck {
    fn safe(kind: SafetyCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            is_unsafe: false,
            message: message.into(),
        }
    }

    fn flagged(kind: SafetyCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            is_unsafe: true,
            message: message.into(),
        }
    }
}

/// Every check from one pre-flight pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    pub checks: Vec<GitSafetyCheck>,
}

impl SafetyReport {
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.checks.iter().all(|c| !c.is_unsafe)
    }

    /// Messages of the unsafe checks, in check order.
    #[must_use]
    pub fn findings(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.is_unsafe)
            .map(|c| c.message.clone())
            .collect()
    }

    /// Block on unsafe findings unless overridden. With the override the
    /// findings are returned so the caller can still surface them.
    pub fn enforce(&self, allow_override: bool) -> Result<Vec<String>> {
        let findings = self.findings();
        if findings.is_empty() || allow_override {
            Ok(findings)
        } else {
            Err(VRalphError::GitUnsafe { findings })
        }
    }
}

/// Run all three checks against `git`.
pub fn check_repository(git: &dyn GitOperations) -> SafetyReport {
    let report = SafetyReport {
        checks: vec![
            check_uncommitted(git),
            check_unpushed(git),
            check_detached(git),
        ],
    };
    for check in report.checks.iter().filter(|c| c.is_unsafe) {
        tracing::debug!(kind = %check.kind, message = %check.message, "Unsafe git state");
    }
    report
}

fn check_uncommitted(git: &dyn GitOperations) -> GitSafetyCheck {
    let kind = SafetyCheckKind::UncommittedChanges;
    match git.uncommitted_files() {
        Ok(files) if files.is_empty() => GitSafetyCheck::safe(kind, "Working tree is clean"),
        Ok(files) => {
            let mut listed = files
                .iter()
                .take(MAX_LISTED_FILES)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if files.len() > MAX_LISTED_FILES {
                listed.push_str(&format!(" ... ({} more)", files.len() - MAX_LISTED_FILES));
            }
            GitSafetyCheck::flagged(
                kind,
                format!("Uncommitted changes in {} file(s): {listed}", files.len()),
            )
        }
        Err(e) => GitSafetyCheck::flagged(kind, format!("Could not check for uncommitted changes: {e}")),
    }
}

fn check_unpushed(git: &dyn GitOperations) -> GitSafetyCheck {
    let kind = SafetyCheckKind::UnpushedCommits;
    match git.commits_ahead_of_upstream() {
        Ok(None) => GitSafetyCheck::safe(kind, "No upstream branch configured"),
        Ok(Some(0)) => GitSafetyCheck::safe(kind, "Up to date with upstream"),
        Ok(Some(n)) => GitSafetyCheck::flagged(
            kind,
            format!("{n} local commit(s) not pushed to upstream"),
        ),
        Err(e) => GitSafetyCheck::flagged(kind, format!("Could not check for unpushed commits: {e}")),
    }
}

fn check_detached(git: &dyn GitOperations) -> GitSafetyCheck {
    let kind = SafetyCheckKind::DetachedHead;
    match git.current_branch() {
        Ok(Some(branch)) => GitSafetyCheck::safe(kind, format!("On branch {branch}")),
        Ok(None) => GitSafetyCheck::flagged(kind, "HEAD is detached (not on any branch)"),
        Err(e) => GitSafetyCheck::flagged(kind, format!("Could not determine current branch: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RealGitOperations;
    use crate::testing::fixtures::TestFixture;
    use crate::testing::mocks::MockGitOperations;

    // =========================================================================
    // Mocked repository state
    // =========================================================================

    #[test]
    fn test_clean_repository_is_safe() {
        let git = MockGitOperations::new();
        let report = check_repository(&git);
        assert!(report.is_safe());
        assert_eq!(report.checks.len(), 3);
        assert!(report.enforce(false).unwrap().is_empty());
    }

    #[test]
    fn test_all_checks_run_when_first_is_unsafe() {
        let git = MockGitOperations::new()
            .with_uncommitted(vec!["a.py".to_string()])
            .with_commits_ahead(Some(2))
            .with_detached_head();
        let report = check_repository(&git);

        let kinds: Vec<_> = report.checks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SafetyCheckKind::UncommittedChanges,
                SafetyCheckKind::UnpushedCommits,
                SafetyCheckKind::DetachedHead
            ]
        );
        assert_eq!(report.findings().len(), 3);
    }

    #[test]
    fn test_enforce_blocks_without_override() {
        let git = MockGitOperations::new().with_detached_head();
        let err = check_repository(&git).enforce(false).unwrap_err();
        assert!(matches!(err, VRalphError::GitUnsafe { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("HEAD is detached"));
    }

    #[test]
    fn test_override_still_surfaces_findings() {
        let git = MockGitOperations::new().with_commits_ahead(Some(1));
        let warnings = check_repository(&git).enforce(true).unwrap();
        assert_eq!(warnings, vec!["1 local commit(s) not pushed to upstream"]);
    }

    #[test]
    fn test_missing_upstream_is_safe() {
        let git = MockGitOperations::new().with_commits_ahead(None);
        let report = check_repository(&git);
        assert!(report.is_safe());
        assert_eq!(report.checks[1].message, "No upstream branch configured");
    }

    #[test]
    fn test_check_error_counts_as_unsafe() {
        let git = MockGitOperations::new().with_status_error("not a git repository");
        let report = check_repository(&git);
        assert!(!report.is_safe());
        assert!(report.checks[0].message.contains("not a git repository"));
    }

    #[test]
    fn test_long_file_list_truncated() {
        let files: Vec<String> = (0..8).map(|i| format!("f{i}.py")).collect();
        let git = MockGitOperations::new().with_uncommitted(files);
        let message = &check_repository(&git).checks[0].message;
        assert!(message.starts_with("Uncommitted changes in 8 file(s): f0.py"));
        assert!(message.ends_with("... (3 more)"));
    }

    // =========================================================================
    // Real repositories
    // =========================================================================

    #[test]
    fn test_real_repo_detached_head() {
        let fixture = TestFixture::with_git_repo();
        fixture.detach_head();
        let report = check_repository(&RealGitOperations::new(fixture.path()));

        assert!(!report.checks[0].is_unsafe);
        assert!(!report.checks[1].is_unsafe);
        assert!(report.checks[2].is_unsafe);
    }

    #[test]
    fn test_real_repo_unpushed_and_dirty() {
        let fixture = TestFixture::with_git_repo().with_upstream();
        fixture.write_file("x.txt", "1\n");
        fixture.commit_all("unpushed");
        fixture.write_file("x.txt", "2\n");

        let report = check_repository(&RealGitOperations::new(fixture.path()));
        assert_eq!(
            report.findings(),
            vec![
                "Uncommitted changes in 1 file(s): x.txt".to_string(),
                "1 local commit(s) not pushed to upstream".to_string(),
            ]
        );
    }
}
