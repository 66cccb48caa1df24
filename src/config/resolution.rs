//! Phase timeout resolution.
//!
//! Each phase timeout is resolved once, before the loop starts, with the
//! following precedence:
//!
//! 1. **Run override** - CLI flags such as `--coder-timeout`
//! 2. **Project** - `timeouts` in `.ralph/config.json`
//! 3. **Built-in default** - coder 300s, validation 120s, audit 180s
//!
//! # Example
//!
//! ```rust
//! use vralph::config::{PhaseTimeouts, TimeoutOverrides};
//! use std::time::Duration;
//!
//! let cli = TimeoutOverrides { coder: Some(60), ..Default::default() };
//! let project = TimeoutOverrides { coder: Some(900), audit: Some(30), ..Default::default() };
//!
//! let timeouts = PhaseTimeouts::resolve(&cli, &project);
//! assert_eq!(timeouts.coder, Duration::from_secs(60));
//! assert_eq!(timeouts.audit, Duration::from_secs(30));
//! assert_eq!(timeouts.validation, Duration::from_secs(120));
//! ```

use crate::error::{Result, VRalphError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Built-in coder timeout in seconds.
pub const DEFAULT_CODER_TIMEOUT_SECS: u64 = 300;

/// Built-in validation timeout in seconds.
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 120;

/// Built-in audit timeout in seconds.
pub const DEFAULT_AUDIT_TIMEOUT_SECS: u64 = 180;

/// Optional per-phase timeouts in seconds, from one configuration level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutOverrides {
    #[serde(default)]
    pub coder: Option<u64>,
    #[serde(default)]
    pub validation: Option<u64>,
    #[serde(default)]
    pub audit: Option<u64>,
}

impl TimeoutOverrides {
    /// Reject zero-second timeouts; a zero timeout would fail every phase.
    pub fn validate(&self, field: &str) -> Result<()> {
        for (name, value) in [
            ("coder", self.coder),
            ("validation", self.validation),
            ("audit", self.audit),
        ] {
            if value == Some(0) {
                return Err(VRalphError::invalid_config(
                    format!("{field}.{name}"),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Fully resolved phase timeouts for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimeouts {
    pub coder: Duration,
    pub validation: Duration,
    pub audit: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            coder: Duration::from_secs(DEFAULT_CODER_TIMEOUT_SECS),
            validation: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            audit: Duration::from_secs(DEFAULT_AUDIT_TIMEOUT_SECS),
        }
    }
}

impl PhaseTimeouts {
    /// Resolve run overrides over project values over built-in defaults.
    #[must_use]
    pub fn resolve(run: &TimeoutOverrides, project: &TimeoutOverrides) -> Self {
        let pick = |run: Option<u64>, project: Option<u64>, default: u64| {
            Duration::from_secs(run.or(project).unwrap_or(default))
        };

        Self {
            coder: pick(run.coder, project.coder, DEFAULT_CODER_TIMEOUT_SECS),
            validation: pick(
                run.validation,
                project.validation,
                DEFAULT_VALIDATION_TIMEOUT_SECS,
            ),
            audit: pick(run.audit, project.audit, DEFAULT_AUDIT_TIMEOUT_SECS),
        }
    }
}
