//! Testing infrastructure for V-Ralph.
//!
//! This module provides traits, mocks, fixtures, and assertions for testing
//! the execution loop and its components without real external processes.
//!
//! # Architecture
//!
//! The testing infrastructure is organized into:
//! - **Traits**: Abstractions for external dependencies (agent, validator, git)
//! - **Mocks**: Deterministic doubles that implement the traits and record calls
//! - **Fixtures**: Temporary projects and git repositories (test-only)
//! - **Assertions**: Custom assertions for execution outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use vralph::testing::{MockGitOperations, ScriptedInvoker, ScriptedValidator};
//!
//! let coder = ScriptedInvoker::new().with_reply("done", "", 0);
//! let validator = ScriptedValidator::new().with_failure("1 test failed");
//! let git = MockGitOperations::new().with_diff("+fn main() {}");
//! ```

pub mod assertions;
#[cfg(test)]
pub mod fixtures;
pub mod mocks;
pub mod traits;

// Re-export commonly used types
pub use assertions::*;
#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CommitFailure;
    use crate::output::OutputSink;
    use crate::process::ProcessOutput;
    use std::path::Path;
    use std::time::Duration;

    // =========================================================================
    // ScriptedInvoker Tests
    // =========================================================================

    #[tokio::test]
    async fn test_scripted_invoker_replays_in_order() {
        let agent = ScriptedInvoker::new()
            .with_reply("", "boom", 1)
            .with_reply("ok", "", 0);
        let dir = Path::new(".");

        let first = agent.invoke("one", Duration::from_secs(1), dir).await;
        let second = agent.invoke("two", Duration::from_secs(2), dir).await;
        let third = agent.invoke("three", Duration::from_secs(3), dir).await;

        assert_eq!(first.exit_code, 1);
        assert_eq!(second.stdout, "ok");
        assert_eq!(third, ProcessOutput::default());
        assert_eq!(agent.call_count(), 3);
        assert_eq!(agent.prompts(), vec!["one", "two", "three"]);
        assert_eq!(agent.timeouts()[1], Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_scripted_invoker_fallback() {
        let agent = ScriptedInvoker::new().with_fallback(ProcessOutput::timeout(Duration::from_secs(5)));
        let output = agent.invoke("x", Duration::from_secs(5), Path::new(".")).await;
        assert!(output.timed_out());
    }

    // =========================================================================
    // ScriptedValidator Tests
    // =========================================================================

    #[tokio::test]
    async fn test_scripted_validator_default_passes() {
        let validator = ScriptedValidator::new();
        let outcome = validator
            .validate("pytest", Path::new("."), Duration::from_secs(1))
            .await;
        assert!(outcome.passed);
        assert_eq!(validator.commands(), vec!["pytest"]);
    }

    #[tokio::test]
    async fn test_scripted_validator_always_failing() {
        let validator = ScriptedValidator::always_failing("E   assert 1 == 2");
        for _ in 0..3 {
            let outcome = validator
                .validate("pytest", Path::new("."), Duration::from_secs(1))
                .await;
            assert!(!outcome.passed);
            assert_eq!(outcome.output, "E   assert 1 == 2");
        }
        assert_eq!(validator.call_count(), 3);
    }

    // =========================================================================
    // MockGitOperations Tests
    // =========================================================================

    #[test]
    fn test_mock_git_defaults() {
        let git = MockGitOperations::default();
        assert!(git.uncommitted_files().unwrap().is_empty());
        assert_eq!(git.commits_ahead_of_upstream().unwrap(), None);
        assert_eq!(git.current_branch().unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_mock_git_records_commits() {
        let git = MockGitOperations::new().with_commit_sha("feedbeef");
        let outcome = git.commit_story("US-1", "Title", &["a.py".to_string()]);
        assert_eq!(outcome.sha(), Some("feedbeef"));
        assert_eq!(git.commits().len(), 1);
        assert_eq!(git.commits()[0].story_id, "US-1");
    }

    #[test]
    fn test_mock_git_commit_failure() {
        let git = MockGitOperations::new().with_commit_failure(CommitFailure::NothingToCommit);
        let outcome = git.commit_story("US-1", "Title", &["a.py".to_string()]);
        assert!(!outcome.is_committed());
    }

    // =========================================================================
    // RecordingOutput Tests
    // =========================================================================

    #[test]
    fn test_recording_output() {
        let output = RecordingOutput::new();
        output.info("starting");
        output.warning("careful");
        output.success("done");

        assert_eq!(output.lines().len(), 3);
        assert_eq!(output.messages(OutputLevel::Warning), vec!["careful"]);
        assert!(output.contains("start"));
        assert!(!output.contains("failure"));
    }
}
