//! Execution results and the per-iteration record.

use std::fmt;

use serde::Serialize;

/// Terminal state of one story execution.
///
/// # Example
///
/// ```
/// use vralph::r#loop::state::ExecutionResult;
///
/// assert_eq!(ExecutionResult::Escalated.to_string(), "ESCALATED");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionResult {
    Success,
    /// Circuit breaker: every iteration was used without success.
    Failed,
    /// The auditor asked for a human. Never retried.
    Escalated,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// How a single iteration ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationOutcome {
    CoderFailed { error: String },
    ValidationFailed { output: String },
    AuditRetry { feedback: String },
    Passed,
    Escalated { reason: String },
}

impl IterationOutcome {
    /// Text carried into the next coder prompt, if the iteration failed.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        match self {
            Self::CoderFailed { error } => Some(error),
            Self::ValidationFailed { output } => Some(output),
            Self::AuditRetry { feedback } => Some(feedback),
            Self::Passed | Self::Escalated { .. } => None,
        }
    }

    /// Short label for progress output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CoderFailed { .. } => "coder failed",
            Self::ValidationFailed { .. } => "validation failed",
            Self::AuditRetry { .. } => "audit requested retry",
            Self::Passed => "passed",
            Self::Escalated { .. } => "escalated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationRecord {
    /// 1-based.
    pub iteration: u32,
    pub outcome: IterationOutcome,
}

/// The single value produced by one story execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutput {
    pub result: ExecutionResult,
    pub story_id: String,
    /// Between 1 and `max_retries`.
    pub iterations: u32,
    /// Feedback from the last failed iteration.
    pub last_error: Option<String>,
    pub escalation_reason: Option<String>,
    pub history: Vec<IterationRecord>,
}

impl ExecutionOutput {
    pub(crate) fn finish(
        result: ExecutionResult,
        story_id: &str,
        history: Vec<IterationRecord>,
    ) -> Self {
        let iterations = history.last().map_or(0, |r| r.iteration);
        let last_error = history
            .iter()
            .rev()
            .find_map(|r| r.outcome.feedback())
            .map(str::to_string);
        let escalation_reason = history.last().and_then(|r| match &r.outcome {
            IterationOutcome::Escalated { reason } => Some(reason.clone()),
            _ => None,
        });
        Self {
            result,
            story_id: story_id.to_string(),
            iterations,
            last_error,
            escalation_reason,
            history,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result == ExecutionResult::Success
    }

    /// `(iteration, feedback)` for every failed iteration, in order.
    #[must_use]
    pub fn retry_history(&self) -> Vec<(u32, &str)> {
        self.history
            .iter()
            .filter_map(|r| r.outcome.feedback().map(|f| (r.iteration, f)))
            .collect()
    }
}
