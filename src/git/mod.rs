//! Git integration.
//!
//! [`RealGitOperations`] shells out to the `git` binary in the project
//! directory. Pre-flight checks live in [`safety`], the whitelist-scoped
//! commit in [`commit`].

pub mod commit;
pub mod safety;

pub use commit::{CommitFailure, CommitOutcome, UNKNOWN_SHA};
pub use safety::{check_repository, GitSafetyCheck, SafetyCheckKind, SafetyReport};

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{Result, VRalphError};
use crate::testing::traits::GitOperations;

/// Run `git` with `args` in `dir`. A non-zero exit is not an error here.
pub(crate) fn run_git(dir: &Path, args: &[&str]) -> Result<Output> {
    debug!(?args, "git");
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| {
            let operation = args.first().copied().unwrap_or("git");
            if e.kind() == std::io::ErrorKind::NotFound {
                VRalphError::git(operation, "'git' command not found in PATH")
            } else {
                VRalphError::git(operation, e.to_string())
            }
        })
}

/// Like [`run_git`], but a non-zero exit becomes [`VRalphError::Git`].
fn run_git_checked(dir: &Path, args: &[&str]) -> Result<String> {
    let output = run_git(dir, args)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(VRalphError::git(
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Real git operations implementation.
///
/// Executes actual git commands against the file system.
#[derive(Debug, Clone)]
pub struct RealGitOperations {
    project_dir: PathBuf,
}

impl RealGitOperations {
    /// Create a new git operations instance for the given directory.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn untracked_files(&self, whitelist: Option<&[String]>) -> Result<Vec<String>> {
        let mut args = vec!["ls-files", "--others", "--exclude-standard"];
        if let Some(paths) = whitelist {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        Ok(non_empty_lines(&run_git_checked(&self.project_dir, &args)?))
    }

    /// New files rendered as additions, since `git diff HEAD` omits them.
    fn untracked_as_diff(&self, path: &str) -> String {
        let content = match std::fs::read_to_string(self.project_dir.join(path)) {
            Ok(content) => content,
            Err(_) => {
                return format!("diff --git a/{path} b/{path}\nnew file (binary or unreadable)\n")
            }
        };

        let mut diff =
            format!("diff --git a/{path} b/{path}\nnew file\n--- /dev/null\n+++ b/{path}\n");
        for line in content.lines() {
            diff.push('+');
            diff.push_str(line);
            diff.push('\n');
        }
        diff
    }
}

impl GitOperations for RealGitOperations {
    fn uncommitted_files(&self) -> Result<Vec<String>> {
        let stdout = run_git_checked(&self.project_dir, &["status", "--porcelain"])?;
        // Format: "XY path"; "??" marks untracked files
        Ok(stdout
            .lines()
            .filter(|line| line.len() > 3 && !line.starts_with("??"))
            .map(|line| line[3..].to_string())
            .collect())
    }

    fn commits_ahead_of_upstream(&self) -> Result<Option<u32>> {
        let upstream = run_git(
            &self.project_dir,
            &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        )?;
        if !upstream.status.success() {
            return Ok(None);
        }

        let count = run_git_checked(&self.project_dir, &["rev-list", "--count", "@{u}..HEAD"])?;
        count
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| {
                VRalphError::git("rev-list", format!("unexpected count '{}': {e}", count.trim()))
            })
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let output = run_git(&self.project_dir, &["symbolic-ref", "--short", "-q", "HEAD"])?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            // -q: exit 1 without output means HEAD is not a symbolic ref
            Some(1) => Ok(None),
            _ => Err(VRalphError::git(
                "symbolic-ref",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }

    fn diff_for_audit(&self, whitelist: Option<&[String]>) -> Result<String> {
        let mut args = vec!["diff", "HEAD"];
        if let Some(paths) = whitelist {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        let mut diff = run_git_checked(&self.project_dir, &args)?;

        for path in self.untracked_files(whitelist)? {
            diff.push_str(&self.untracked_as_diff(&path));
        }
        Ok(diff)
    }

    fn commit_story(&self, story_id: &str, title: &str, whitelist: &[String]) -> CommitOutcome {
        commit::commit_whitelisted(&self.project_dir, story_id, title, whitelist)
    }
}
