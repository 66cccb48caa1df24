//! Configuration management for V-Ralph.
//!
//! Project settings live in `.ralph/config.json`. Every field is optional and
//! falls back to a built-in default, so a project without a config file runs
//! with the defaults below.

pub mod resolution;
pub mod validation;

pub use resolution::{PhaseTimeouts, TimeoutOverrides};
pub use validation::{DryRunValidator, ValidationCheck, ValidationReport};

use crate::error::{Result, VRalphError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of iterations before the circuit breaker opens.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of recent history entries loaded from the progress log.
pub const DEFAULT_MAX_HISTORY: usize = 5;

/// Default seconds between SIGTERM and SIGKILL for a timed-out process.
pub const DEFAULT_GRACE_SECS: u64 = 5;

/// What the runner does after a story ends FAILED or ESCALATED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitBreakerPolicy {
    /// End the whole run.
    #[default]
    Stop,
    /// Move on to the next pending story.
    Continue,
}

impl std::fmt::Display for CircuitBreakerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// How the prompt reaches the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptDelivery {
    /// Written to the child's stdin, then stdin is closed.
    #[default]
    Stdin,
    /// Appended as the final command-line argument.
    Argument,
}

/// External agent executable settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,

    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub prompt_via: PromptDelivery,

    /// Seconds to wait after a graceful terminate before force-killing.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["-p".to_string(), "--dangerously-skip-permissions".to_string()]
}

fn default_grace_secs() -> u64 {
    DEFAULT_GRACE_SECS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            prompt_via: PromptDelivery::default(),
            grace_secs: DEFAULT_GRACE_SECS,
        }
    }
}

/// Auditor phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_auditor_prompt")]
    pub prompt_path: PathBuf,
}

fn default_auditor_prompt() -> PathBuf {
    PathBuf::from("prompts/auditor.md")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_path: default_auditor_prompt(),
        }
    }
}

/// Project configuration loaded from .ralph/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-project phase timeouts in seconds; unset phases use the built-in default.
    #[serde(default)]
    pub timeouts: TimeoutOverrides,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default = "default_coder_prompt")]
    pub coder_prompt_path: PathBuf,

    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,

    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Whitelist applied to stories that do not carry their own.
    #[serde(default)]
    pub files_whitelist: Option<Vec<String>>,

    #[serde(default)]
    pub on_circuit_breaker: CircuitBreakerPolicy,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_coder_prompt() -> PathBuf {
    PathBuf::from("prompts/coder.md")
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("progress.txt")
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeouts: TimeoutOverrides::default(),
            audit: AuditConfig::default(),
            coder_prompt_path: default_coder_prompt(),
            progress_path: default_progress_path(),
            max_history: DEFAULT_MAX_HISTORY,
            agent: AgentConfig::default(),
            files_whitelist: None,
            on_circuit_breaker: CircuitBreakerPolicy::default(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a project directory
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&settings_path)?;
        let config: ProjectConfig = serde_json::from_str(&content).map_err(|e| {
            VRalphError::config_with_path(format!("{e}"), settings_path.clone())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the config.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".ralph/config.json")
    }

    /// Resolve a configured path against the project directory.
    pub fn resolve_path(project_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_dir.join(path)
        }
    }

    /// Reject values the executor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(VRalphError::invalid_config(
                "maxRetries",
                "must be at least 1",
            ));
        }
        if self.max_history == 0 {
            return Err(VRalphError::invalid_config(
                "maxHistory",
                "must be at least 1",
            ));
        }
        if self.agent.command.trim().is_empty() {
            return Err(VRalphError::invalid_config(
                "agent.command",
                "must not be empty",
            ));
        }
        self.timeouts.validate("timeouts")
    }
}
