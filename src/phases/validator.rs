//! Runs the project's verification command through `sh -c`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::process::{format_timeout, ProcessSpec, ProcessSupervisor};
use crate::testing::{ValidationOutcome, Validator};

/// Shell validator backed by the process supervisor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellValidator {
    supervisor: ProcessSupervisor,
}

impl ShellValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_supervisor(supervisor: ProcessSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Validator for ShellValidator {
    async fn validate(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> ValidationOutcome {
        if command.trim().is_empty() {
            debug!("No validation command, skipping");
            return ValidationOutcome::skipped();
        }

        let spec = ProcessSpec::new("sh", working_dir).with_args(["-c", command]);
        let output = self.supervisor.run(&spec, timeout).await;
        debug!(command, exit_code = output.exit_code, "Validation finished");

        if output.timed_out() {
            ValidationOutcome::failed(format!(
                "Validation command timed out after {}",
                format_timeout(timeout)
            ))
        } else if output.exit_code == crate::process::INVOKER_FAILURE_CODE {
            ValidationOutcome::failed(format!("Validation command failed: {}", output.stderr))
        } else if output.success() {
            ValidationOutcome::passed(output.combined())
        } else {
            ValidationOutcome::failed(output.combined())
        }
    }
}
