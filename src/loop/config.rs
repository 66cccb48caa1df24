//! Per-story executor settings.

use std::path::PathBuf;

use crate::config::{PhaseTimeouts, DEFAULT_MAX_RETRIES};
use crate::error::{Result, VRalphError};

/// Everything the executor needs for one story. Built once, never mutated
/// while the story runs.
///
/// # Example
///
/// ```
/// use vralph::r#loop::ExecutorConfig;
///
/// let config = ExecutorConfig::new(".")
///     .with_max_retries(5)
///     .with_validation_command("cargo test")
///     .with_audit(false);
/// assert_eq!(config.max_retries, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_retries: u32,
    /// Empty means validation is skipped.
    pub validation_command: String,
    pub working_dir: PathBuf,
    pub coder_prompt_path: PathBuf,
    pub auditor_prompt_path: PathBuf,
    /// Rendered progress-log learnings.
    pub learnings: String,
    pub files_whitelist: Option<Vec<String>>,
    pub timeouts: PhaseTimeouts,
    pub audit_enabled: bool,
}

impl ExecutorConfig {
    /// Defaults rooted at `working_dir`, with templates under `prompts/`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            validation_command: String::new(),
            coder_prompt_path: working_dir.join("prompts/coder.md"),
            auditor_prompt_path: working_dir.join("prompts/auditor.md"),
            working_dir,
            learnings: String::new(),
            files_whitelist: None,
            timeouts: PhaseTimeouts::default(),
            audit_enabled: true,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_validation_command(mut self, command: impl Into<String>) -> Self {
        self.validation_command = command.into();
        self
    }

    #[must_use]
    pub fn with_coder_prompt(mut self, path: impl Into<PathBuf>) -> Self {
        self.coder_prompt_path = path.into();
        self
    }

    #[must_use]
    pub fn with_auditor_prompt(mut self, path: impl Into<PathBuf>) -> Self {
        self.auditor_prompt_path = path.into();
        self
    }

    #[must_use]
    pub fn with_learnings(mut self, learnings: impl Into<String>) -> Self {
        self.learnings = learnings.into();
        self
    }

    #[must_use]
    pub fn with_whitelist(mut self, whitelist: Option<Vec<String>>) -> Self {
        self.files_whitelist = whitelist;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: PhaseTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// # Errors
    ///
    /// Returns an error if `max_retries` is zero, any timeout is zero, or the
    /// working directory does not exist.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(VRalphError::invalid_config(
                "max_retries",
                "must be at least 1",
            ));
        }
        for (name, timeout) in [
            ("coder", self.timeouts.coder),
            ("validation", self.timeouts.validation),
            ("audit", self.timeouts.audit),
        ] {
            if timeout.is_zero() {
                return Err(VRalphError::invalid_config(
                    format!("timeouts.{name}"),
                    "must be greater than zero",
                ));
            }
        }
        if !self.working_dir.is_dir() {
            return Err(VRalphError::config_with_path(
                "Working directory does not exist",
                self.working_dir.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::new("/project");
        assert_eq!(config.max_retries, 3);
        assert!(config.audit_enabled);
        assert_eq!(config.coder_prompt_path, PathBuf::from("/project/prompts/coder.md"));
        assert_eq!(config.timeouts.coder, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let temp = TempDir::new().unwrap();
        let err = ExecutorConfig::new(temp.path())
            .with_max_retries(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let temp = TempDir::new().unwrap();
        let timeouts = PhaseTimeouts {
            audit: Duration::ZERO,
            ..PhaseTimeouts::default()
        };
        let err = ExecutorConfig::new(temp.path())
            .with_timeouts(timeouts)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("timeouts.audit"));
    }

    #[test]
    fn test_missing_working_dir_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(ExecutorConfig::new(temp.path().join("missing"))
            .validate()
            .is_err());
    }
}
