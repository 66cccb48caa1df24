//! Trait definitions for testable abstractions.
//!
//! These traits sit at every boundary where the execution loop touches the
//! outside world: the agent process, the validation command, and git. The
//! loop only ever sees these traits, so tests swap in the deterministic
//! doubles from [`super::mocks`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::git::CommitOutcome;
use crate::process::ProcessOutput;

/// A single-prompt call to an external agent.
///
/// Implementations never fail with an error: spawn failures, timeouts and
/// missing binaries come back as a [`ProcessOutput`] with `exit_code == -1`.
///
/// # Example
///
/// ```rust,ignore
/// use vralph::testing::AgentInvoker;
///
/// async fn ask(agent: &impl AgentInvoker, dir: &Path) -> bool {
///     agent.invoke("Say hi", Duration::from_secs(30), dir).await.success()
/// }
/// ```
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str, timeout: Duration, working_dir: &Path) -> ProcessOutput;
}

/// Result of running the validation command once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// Combined stdout and stderr, or the invoker's failure message.
    pub output: String,
    /// True when no command was configured.
    pub skipped: bool,
}

impl ValidationOutcome {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
            skipped: false,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
            skipped: false,
        }
    }

    #[must_use]
    pub fn skipped() -> Self {
        Self {
            passed: true,
            output: String::new(),
            skipped: true,
        }
    }
}

/// Runs the project's verification command.
///
/// Never fails; every problem is reported as a failed [`ValidationOutcome`].
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, command: &str, working_dir: &Path, timeout: Duration)
        -> ValidationOutcome;
}

/// Abstraction for git operations.
///
/// Enables testing the safety checks, audit diff and commit flow without a
/// real repository.
///
/// # Example
///
/// ```rust,ignore
/// use vralph::testing::GitOperations;
///
/// fn is_clean(git: &impl GitOperations) -> bool {
///     git.uncommitted_files().map(|f| f.is_empty()).unwrap_or(false)
/// }
/// ```
pub trait GitOperations: Send + Sync {
    /// Tracked files with staged or unstaged changes. Untracked files are not
    /// included.
    ///
    /// # Errors
    ///
    /// Returns an error if git is unavailable or this is not a repository.
    fn uncommitted_files(&self) -> Result<Vec<String>>;

    /// Number of local commits not on the upstream branch, or `None` when no
    /// upstream is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if git is unavailable or this is not a repository.
    fn commits_ahead_of_upstream(&self) -> Result<Option<u32>>;

    /// Current branch name, or `None` for a detached HEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if git is unavailable or this is not a repository.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Diff shown to the auditor: changes against HEAD plus the contents of
    /// new files. A whitelist limits both to the listed paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the diff cannot be produced.
    fn diff_for_audit(&self, whitelist: Option<&[String]>) -> Result<String>;

    /// Stage the changed whitelisted files and commit them as
    /// `feat: {story_id} - {title}`.
    fn commit_story(&self, story_id: &str, title: &str, whitelist: &[String]) -> CommitOutcome;
}
