//! The coder → validator → auditor state machine for one story.
//!
//! Every iteration runs the phases strictly in order and ends in one of:
//!
//! | Coder    | Validator | Auditor  | Next                          |
//! |----------|-----------|----------|-------------------------------|
//! | fails    |           |          | retry with the coder's stderr |
//! | ok       | fails     |          | retry with the command output |
//! | ok       | passes    | disabled | SUCCESS                       |
//! | ok       | passes    | PASS     | SUCCESS                       |
//! | ok       | passes    | RETRY    | retry with the feedback       |
//! | ok       | passes    | ESCALATE | ESCALATED                     |
//!
//! Once `max_retries` iterations have failed the story is FAILED with the
//! last recorded error.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::ExecutorConfig;
use super::state::{ExecutionOutput, ExecutionResult, IterationOutcome, IterationRecord};
use crate::config::ProjectConfig;
use crate::error::Result;
use crate::git::RealGitOperations;
use crate::output::{truncate, ConsoleOutput, OutputSink};
use crate::phases::{AuditVerdict, AuditorPhase, CoderOutcome, CoderPhase, ShellValidator};
use crate::prd::Story;
use crate::process::{AgentProcess, ProcessSupervisor};
use crate::prompt::{CoderPromptInput, PromptTemplate, SectionBuilder};
use crate::testing::{AgentInvoker, GitOperations, Validator};

/// Length of error excerpts shown on the console.
const EXCERPT_CHARS: usize = 200;

/// Shown to the auditor when there is nothing to review.
const EMPTY_DIFF: &str = "(No changes detected)";

/// External collaborators of the executor.
///
/// The coder and auditor are separate invokers so the auditor never shares
/// anything with the coding session.
///
/// # Example
///
/// ```rust,ignore
/// use vralph::r#loop::ExecutorDependencies;
/// use vralph::testing::{MockGitOperations, RecordingOutput, ScriptedInvoker, ScriptedValidator};
/// use std::sync::Arc;
///
/// let deps = ExecutorDependencies {
///     coder: Arc::new(ScriptedInvoker::new()),
///     auditor: Arc::new(ScriptedInvoker::new().with_reply("PASS", "", 0)),
///     validator: Arc::new(ScriptedValidator::new()),
///     git: Arc::new(MockGitOperations::new()),
///     output: Arc::new(RecordingOutput::new()),
/// };
/// ```
#[derive(Clone)]
pub struct ExecutorDependencies {
    pub coder: Arc<dyn AgentInvoker>,
    pub auditor: Arc<dyn AgentInvoker>,
    pub validator: Arc<dyn Validator>,
    pub git: Arc<dyn GitOperations>,
    pub output: Arc<dyn OutputSink>,
}

impl std::fmt::Debug for ExecutorDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorDependencies")
            .field("coder", &"<dyn AgentInvoker>")
            .field("auditor", &"<dyn AgentInvoker>")
            .field("validator", &"<dyn Validator>")
            .field("git", &"<dyn GitOperations>")
            .field("output", &"<dyn OutputSink>")
            .finish()
    }
}

impl ExecutorDependencies {
    /// Real processes, real git and console output.
    #[must_use]
    pub fn real(project_dir: PathBuf, config: &ProjectConfig) -> Self {
        let agent = Arc::new(AgentProcess::from_config(&config.agent));
        let supervisor =
            ProcessSupervisor::new(std::time::Duration::from_secs(config.agent.grace_secs));
        Self {
            coder: agent.clone(),
            auditor: agent,
            validator: Arc::new(ShellValidator::with_supervisor(supervisor)),
            git: Arc::new(RealGitOperations::new(project_dir)),
            output: Arc::new(ConsoleOutput::new()),
        }
    }
}

/// Runs one story to a terminal result.
#[derive(Debug, Clone)]
pub struct StoryExecutor {
    deps: ExecutorDependencies,
}

impl StoryExecutor {
    #[must_use]
    pub fn new(deps: ExecutorDependencies) -> Self {
        Self { deps }
    }

    #[must_use]
    pub fn deps(&self) -> &ExecutorDependencies {
        &self.deps
    }

    /// Execute `story` until SUCCESS, ESCALATED or the retry budget runs out.
    ///
    /// # Errors
    ///
    /// Returns an error before the first iteration if the config is invalid
    /// or a prompt template is missing. Nothing that happens inside an
    /// iteration is an error.
    pub async fn execute(&self, story: &Story, config: &ExecutorConfig) -> Result<ExecutionOutput> {
        config.validate()?;
        let coder_template = PromptTemplate::load("Coder", &config.coder_prompt_path)?;
        let auditor_template = if config.audit_enabled {
            Some(PromptTemplate::load("Auditor", &config.auditor_prompt_path)?)
        } else {
            None
        };

        let out = self.deps.output.as_ref();
        let coder = CoderPhase::new(self.deps.coder.as_ref(), &coder_template, config.timeouts.coder);
        let auditor = auditor_template
            .as_ref()
            .map(|t| AuditorPhase::new(self.deps.auditor.as_ref(), t, config.timeouts.audit));
        let audit_spec = SectionBuilder::audit_spec(story);
        let whitelist = config.files_whitelist.as_deref();

        info!(story = %story.id, max_retries = config.max_retries, audit = config.audit_enabled, "Executing story");

        let mut history: Vec<IterationRecord> = Vec::new();
        let mut error_context: Option<String> = None;

        for iteration in 1..=config.max_retries {
            out.header(&format!("Iteration {iteration}/{}", config.max_retries));

            let outcome = self
                .iterate(
                    story,
                    config,
                    &coder,
                    auditor.as_ref(),
                    &audit_spec,
                    whitelist,
                    error_context.as_deref(),
                )
                .await;
            debug!(story = %story.id, iteration, outcome = outcome.label(), "Iteration finished");

            error_context = outcome.feedback().map(str::to_string);
            let terminal = match &outcome {
                IterationOutcome::Passed => Some(ExecutionResult::Success),
                IterationOutcome::Escalated { .. } => Some(ExecutionResult::Escalated),
                _ => None,
            };
            history.push(IterationRecord { iteration, outcome });

            if let Some(result) = terminal {
                return Ok(ExecutionOutput::finish(result, &story.id, history));
            }
        }

        warn!(story = %story.id, iterations = config.max_retries, "Circuit breaker tripped");
        out.error(&format!(
            "Circuit breaker: {} failed after {} iteration(s)",
            story.id, config.max_retries
        ));
        Ok(ExecutionOutput::finish(ExecutionResult::Failed, &story.id, history))
    }

    #[allow(clippy::too_many_arguments)]
    async fn iterate(
        &self,
        story: &Story,
        config: &ExecutorConfig,
        coder: &CoderPhase<'_>,
        auditor: Option<&AuditorPhase<'_>>,
        audit_spec: &str,
        whitelist: Option<&[String]>,
        error_context: Option<&str>,
    ) -> IterationOutcome {
        let out = self.deps.output.as_ref();
        let input = CoderPromptInput {
            story,
            whitelist,
            learnings: &config.learnings,
            error_context,
        };

        out.start_spinner("Coder working...");
        let coded = coder.run(&input, &config.working_dir).await;
        out.stop_spinner();
        if let CoderOutcome::Failed { error, .. } = coded {
            out.error(&format!("Coder failed: {}", truncate(&error, EXCERPT_CHARS)));
            return IterationOutcome::CoderFailed { error };
        }
        out.success("Coder finished");

        out.start_spinner("Validating...");
        let validation = self
            .deps
            .validator
            .validate(
                &config.validation_command,
                &config.working_dir,
                config.timeouts.validation,
            )
            .await;
        out.stop_spinner();
        if !validation.passed {
            out.error(&format!(
                "Validation failed: {}",
                truncate(&validation.output, EXCERPT_CHARS)
            ));
            return IterationOutcome::ValidationFailed {
                output: validation.output,
            };
        }
        if validation.skipped {
            out.warning("No validation command configured, skipping validation");
        } else {
            out.success("Validation passed");
        }

        let Some(auditor) = auditor else {
            return IterationOutcome::Passed;
        };

        let diff = match self.deps.git.diff_for_audit(whitelist) {
            Ok(diff) if diff.trim().is_empty() => EMPTY_DIFF.to_string(),
            Ok(diff) => diff,
            Err(e) => {
                warn!(error = %e, "Could not produce audit diff");
                format!("(Diff unavailable: {e})")
            }
        };

        out.start_spinner("Auditing...");
        let verdict = auditor.audit(audit_spec, &diff, &config.working_dir).await;
        out.stop_spinner();
        match verdict {
            AuditVerdict::Pass => {
                out.success("Audit passed");
                IterationOutcome::Passed
            }
            AuditVerdict::Retry { feedback } => {
                out.warning(&format!(
                    "Audit requested retry: {}",
                    truncate(&feedback, EXCERPT_CHARS)
                ));
                IterationOutcome::AuditRetry { feedback }
            }
            AuditVerdict::Escalate { reason } => {
                out.error(&format!("Audit escalated: {reason}"));
                IterationOutcome::Escalated { reason }
            }
        }
    }
}
