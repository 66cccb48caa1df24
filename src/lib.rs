//! V-Ralph - story execution engine
//!
//! Takes user stories from a PRD file and drives an external coding agent
//! through a Coder, Validator, Auditor loop until each story passes, is
//! escalated to a human, or exhausts its retry budget.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`] - Project settings, timeout resolution and dry-run checks
//! - [`error`] - Custom error types and handling
//! - [`git`] - Safety checks, audit diffs and whitelist-scoped commits
//! - [`r#loop`] - The per-story executor and the multi-story runner
//! - [`phases`] - Coder, Validator and Auditor phases
//! - [`prd`] - PRD file model
//! - [`process`] - Supervised child processes with timeouts
//! - [`progress`] - Learnings log and its health check
//! - [`prompt`] - Prompt templates and section building
//! - [`summary`] - End-of-run report
//! - [`testing`] - Testing infrastructure (traits, mocks, fixtures)
//!
//! # Example
//!
//! ```rust,ignore
//! use vralph::config::ProjectConfig;
//! use vralph::r#loop::{ExecutorDependencies, RunOptions, StoryRunner};
//!
//! let config = ProjectConfig::load(project)?;
//! let deps = ExecutorDependencies::real(project, &config);
//! let runner = StoryRunner::new(project, project.join("prd.json"), config, deps);
//! let summary = runner.run(&RunOptions::default()).await?;
//! std::process::exit(summary.exit_code());
//! ```

pub mod config;
pub mod error;
pub mod git;
pub mod r#loop;
pub mod output;
pub mod phases;
pub mod prd;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod summary;
pub mod testing;

// Re-export commonly used types
pub use error::{Result, VRalphError};

pub use config::ProjectConfig;
pub use prd::{Prd, Story};
pub use r#loop::{ExecutionOutput, ExecutionResult, StoryExecutor, StoryRunner};

// Re-export testing types for convenience
pub use testing::{
    AgentInvoker, GitOperations, MockGitOperations, ScriptedInvoker, ScriptedValidator, Validator,
};

// TestFixture is only available in test builds
#[cfg(test)]
pub use testing::TestFixture;
