//! Mock implementations of testing traits.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests. Each records what it was asked to do so
//! tests can assert on call counts and exact inputs.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{AgentInvoker, GitOperations, ValidationOutcome, Validator};
use crate::error::{Result, VRalphError};
use crate::git::{CommitFailure, CommitOutcome};
use crate::output::OutputSink;
use crate::process::ProcessOutput;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Agent double that replays queued replies in order.
///
/// Once the queue is empty every further call gets the fallback reply
/// (exit code 0, no output, unless configured otherwise).
///
/// # Example
///
/// ```rust,ignore
/// let agent = ScriptedInvoker::new()
///     .with_reply("", "compile error", 1)
///     .with_reply("done", "", 0);
///
/// agent.invoke("first", timeout, dir).await;  // exit 1
/// agent.invoke("second", timeout, dir).await; // exit 0
/// assert_eq!(agent.prompts()[1], "second");
/// ```
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    replies: Mutex<VecDeque<ProcessOutput>>,
    fallback: ProcessOutput,
    prompts: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Duration>>,
    call_count: AtomicU32,
}

impl ScriptedInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    #[must_use]
    pub fn with_reply(self, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.with_output(ProcessOutput::new(stdout, stderr, exit_code))
    }

    #[must_use]
    pub fn with_output(self, output: ProcessOutput) -> Self {
        lock(&self.replies).push_back(output);
        self
    }

    /// Reply used once the queue runs dry.
    #[must_use]
    pub fn with_fallback(mut self, output: ProcessOutput) -> Self {
        self.fallback = output;
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        lock(&self.timeouts).clone()
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, prompt: &str, timeout: Duration, _working_dir: &Path) -> ProcessOutput {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.timeouts).push(timeout);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Validator double that replays queued outcomes; passes once exhausted.
#[derive(Debug)]
pub struct ScriptedValidator {
    outcomes: Mutex<VecDeque<ValidationOutcome>>,
    fallback: ValidationOutcome,
    commands: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl Default for ScriptedValidator {
    fn default() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: ValidationOutcome::passed(""),
            commands: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl ScriptedValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator that fails every call with `output`.
    #[must_use]
    pub fn always_failing(output: &str) -> Self {
        Self::new().with_fallback(ValidationOutcome::failed(output))
    }

    #[must_use]
    pub fn with_pass(self, output: &str) -> Self {
        self.with_outcome(ValidationOutcome::passed(output))
    }

    #[must_use]
    pub fn with_failure(self, output: &str) -> Self {
        self.with_outcome(ValidationOutcome::failed(output))
    }

    #[must_use]
    pub fn with_outcome(self, outcome: ValidationOutcome) -> Self {
        lock(&self.outcomes).push_back(outcome);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, outcome: ValidationOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn validate(
        &self,
        command: &str,
        _working_dir: &Path,
        _timeout: Duration,
    ) -> ValidationOutcome {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.commands).push(command.to_string());
        lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A commit request captured by [`MockGitOperations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub story_id: String,
    pub title: String,
    pub whitelist: Vec<String>,
}

/// Mock implementation of git operations.
///
/// Defaults describe a clean repository on `main` with no upstream, and a
/// commit call that succeeds.
///
/// # Example
///
/// ```rust,ignore
/// let git = MockGitOperations::new()
///     .with_uncommitted(vec!["src/lib.rs".to_string()])
///     .with_detached_head();
///
/// assert!(!check_repository(&git).is_safe());
/// ```
#[derive(Debug)]
pub struct MockGitOperations {
    uncommitted: Vec<String>,
    status_error: Option<String>,
    commits_ahead: Option<u32>,
    branch: Option<String>,
    diff: String,
    commit_sha: String,
    commit_failure: Option<CommitFailure>,
    commits: Mutex<Vec<RecordedCommit>>,
    diff_requests: Mutex<Vec<Option<Vec<String>>>>,
}

impl Default for MockGitOperations {
    fn default() -> Self {
        Self {
            uncommitted: Vec::new(),
            status_error: None,
            commits_ahead: None,
            branch: Some("main".to_string()),
            diff: String::new(),
            commit_sha: "abc123def4567890abc123def4567890abc123de".to_string(),
            commit_failure: None,
            commits: Mutex::new(Vec::new()),
            diff_requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockGitOperations {
    /// Create a new mock with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_uncommitted(mut self, files: Vec<String>) -> Self {
        self.uncommitted = files;
        self
    }

    /// Make the status query fail.
    #[must_use]
    pub fn with_status_error(mut self, message: &str) -> Self {
        self.status_error = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn with_commits_ahead(mut self, ahead: Option<u32>) -> Self {
        self.commits_ahead = ahead;
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    #[must_use]
    pub fn with_detached_head(mut self) -> Self {
        self.branch = None;
        self
    }

    /// Diff returned to the auditor.
    #[must_use]
    pub fn with_diff(mut self, diff: &str) -> Self {
        self.diff = diff.to_string();
        self
    }

    #[must_use]
    pub fn with_commit_sha(mut self, sha: &str) -> Self {
        self.commit_sha = sha.to_string();
        self
    }

    #[must_use]
    pub fn with_commit_failure(mut self, failure: CommitFailure) -> Self {
        self.commit_failure = Some(failure);
        self
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        lock(&self.commits).clone()
    }

    /// Whitelists passed to each `diff_for_audit` call.
    pub fn diff_requests(&self) -> Vec<Option<Vec<String>>> {
        lock(&self.diff_requests).clone()
    }
}

impl GitOperations for MockGitOperations {
    fn uncommitted_files(&self) -> Result<Vec<String>> {
        match &self.status_error {
            Some(message) => Err(VRalphError::git("status", message.clone())),
            None => Ok(self.uncommitted.clone()),
        }
    }

    fn commits_ahead_of_upstream(&self) -> Result<Option<u32>> {
        Ok(self.commits_ahead)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.branch.clone())
    }

    fn diff_for_audit(&self, whitelist: Option<&[String]>) -> Result<String> {
        lock(&self.diff_requests).push(whitelist.map(<[String]>::to_vec));
        Ok(self.diff.clone())
    }

    fn commit_story(&self, story_id: &str, title: &str, whitelist: &[String]) -> CommitOutcome {
        lock(&self.commits).push(RecordedCommit {
            story_id: story_id.to_string(),
            title: title.to_string(),
            whitelist: whitelist.to_vec(),
        });

        if whitelist.is_empty() {
            return CommitOutcome::Failed(CommitFailure::EmptyWhitelist);
        }
        match &self.commit_failure {
            Some(failure) => CommitOutcome::Failed(failure.clone()),
            None => CommitOutcome::Committed {
                sha: self.commit_sha.clone(),
                files: whitelist.to_vec(),
            },
        }
    }
}

/// Severity of a recorded output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Success,
    Error,
    Warning,
    Info,
    Header,
}

/// Output sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    lines: Mutex<Vec<(OutputLevel, String)>>,
}

impl RecordingOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(OutputLevel, String)> {
        lock(&self.lines).clone()
    }

    /// Messages at one level.
    pub fn messages(&self, level: OutputLevel) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// True if any line at any level contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|(_, m)| m.contains(needle))
    }

    fn record(&self, level: OutputLevel, message: &str) {
        lock(&self.lines).push((level, message.to_string()));
    }
}

impl OutputSink for RecordingOutput {
    fn success(&self, message: &str) {
        self.record(OutputLevel::Success, message);
    }

    fn error(&self, message: &str) {
        self.record(OutputLevel::Error, message);
    }

    fn warning(&self, message: &str) {
        self.record(OutputLevel::Warning, message);
    }

    fn info(&self, message: &str) {
        self.record(OutputLevel::Info, message);
    }

    fn header(&self, message: &str) {
        self.record(OutputLevel::Header, message);
    }
}
