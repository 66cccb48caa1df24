//! Story execution loop.
//!
//! - [`config`] - Per-story executor settings
//! - [`executor`] - The Coder, Validator, Auditor iteration for one story
//! - [`runner`] - Story selection, git pre-flight and post-story bookkeeping
//! - [`state`] - Results and the per-iteration record
//!
//! # Architecture
//!
//! Each iteration runs three phases in order. Any failure feeds back into the
//! next Coder prompt until the retry budget is spent.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Coder     │────>│  Validator   │────>│   Auditor   │
//! │ (agent)     │     │ (shell cmd)  │     │ (agent)     │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!       ^                    │                    │
//!       │     failure        │    RETRY           │ PASS / ESCALATE
//!       └────────────────────┴────────────────────┤
//!                                                 v
//!                                       ┌──────────────────┐
//!                                       │ ExecutionOutput  │
//!                                       └──────────────────┘
//! ```

pub mod config;
pub mod executor;
pub mod runner;
pub mod state;

pub use config::ExecutorConfig;
pub use executor::{ExecutorDependencies, StoryExecutor};
pub use runner::{RunOptions, StoryRunner};
pub use state::{ExecutionOutput, ExecutionResult, IterationOutcome, IterationRecord};
