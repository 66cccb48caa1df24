//! Custom error types for V-Ralph.
//!
//! Only conditions that stop a run before or between stories are errors.
//! Failures inside an iteration (agent crash, red validation, unclear audit)
//! are ordinary values that feed the next iteration, so they never show up
//! here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for V-Ralph operations
#[derive(Error, Debug)]
pub enum VRalphError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    /// PRD file does not exist
    #[error("PRD file not found: {path}")]
    PrdNotFound { path: PathBuf },

    /// PRD file exists but cannot be parsed
    #[error("Invalid PRD file {path}: {reason}")]
    InvalidPrd { path: PathBuf, reason: String },

    /// Requested story id is not in the PRD
    #[error("Story not found: {story_id}")]
    StoryNotFound {
        story_id: String,
        available: Vec<String>,
    },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// A phase prompt template is missing; no iteration can run without it
    #[error("{phase} prompt not found: {path}")]
    PromptTemplateMissing { phase: String, path: PathBuf },

    /// The agent process could not be started at all
    #[error("Agent invocation failed: {message}")]
    Invocation { message: String },

    // =========================================================================
    // Git Errors
    // =========================================================================
    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Repository is in a state that blocks the run
    #[error("Unsafe git state: {}", findings.join("; "))]
    GitUnsafe { findings: Vec<String> },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VRalphError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a missing prompt template error
    pub fn prompt_missing(phase: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::PromptTemplateMissing {
            phase: phase.into(),
            path: path.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is fatal (aborts before any iteration runs)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PromptTemplateMissing { .. }
                | Self::MissingFile { .. }
                | Self::InvalidConfig { .. }
                | Self::PrdNotFound { .. }
                | Self::InvalidPrd { .. }
        )
    }

    /// Check if this error requires human intervention
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::GitUnsafe { .. })
    }

    /// Process exit status: 2 when a human has to act first, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.requires_human() {
            2
        } else {
            1
        }
    }

    /// Actionable next step for the user, if one is known.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::PrdNotFound { path } => Some(format!(
                "Create a prd.json file at '{}' with your project configuration, \
                 or point --prd at an existing one.",
                path.display()
            )),
            Self::InvalidPrd { .. } => Some(
                "Check your PRD file for valid JSON syntax and required story fields \
                 (id, title, description)."
                    .to_string(),
            ),
            Self::StoryNotFound {
                story_id,
                available,
            } => {
                if available.is_empty() {
                    Some(format!(
                        "Story '{story_id}' does not exist in the PRD. \
                         Use 'vralph status' to see available stories."
                    ))
                } else {
                    let mut ids = available
                        .iter()
                        .take(10)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ");
                    if available.len() > 10 {
                        ids.push_str(&format!(" ... ({} more)", available.len() - 10));
                    }
                    Some(format!(
                        "Story '{story_id}' does not exist in the PRD. Available story IDs: {ids}"
                    ))
                }
            }
            Self::PromptTemplateMissing { .. } => Some(
                "Run 'vralph init' to write the default prompt templates, \
                 or fix the prompt path in .ralph/config.json."
                    .to_string(),
            ),
            Self::GitUnsafe { .. } => Some(
                "Commit or stash your work, push pending commits and check out a branch, \
                 or re-run with --allow-dirty to proceed anyway."
                    .to_string(),
            ),
            Self::Git { .. } => Some(
                "Make sure the project is a git repository ('git init') and git is on PATH."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Type alias for V-Ralph results
pub type Result<T> = std::result::Result<T, VRalphError>;
