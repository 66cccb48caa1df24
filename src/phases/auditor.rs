//! Independent audit of a validated change.
//!
//! The auditor gets the story spec and the diff and nothing else. Its reply
//! is free text; [`parse_verdict`] turns it into an [`AuditVerdict`], and any
//! reply that is not clearly a verdict becomes a retry.
//!
//! # Example
//!
//! ```
//! use vralph::phases::auditor::{parse_verdict, AuditVerdict};
//!
//! assert_eq!(parse_verdict("PASS"), AuditVerdict::Pass);
//! assert_eq!(
//!     parse_verdict("RETRY: missing docstring"),
//!     AuditVerdict::Retry { feedback: "missing docstring".to_string() }
//! );
//! assert!(parse_verdict("Looks great to me!").is_retry());
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::prompt::{build_audit_prompt, PromptTemplate};
use crate::testing::AgentInvoker;

const RETRY_PREFIX: &str = "RETRY:";
const ESCALATE_PREFIX: &str = "ESCALATE:";
const PASS_LINE: &str = "PASS";
const CODE_FENCE: &str = "```";

/// Characters of raw output quoted back when the verdict is unclear.
pub const UNCLEAR_EXCERPT_CHARS: usize = 500;

/// The auditor's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditVerdict {
    Pass,
    Retry { feedback: String },
    Escalate { reason: String },
}

impl AuditVerdict {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    #[must_use]
    pub fn is_escalate(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }

    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        match self {
            Self::Retry { feedback } => Some(feedback),
            _ => None,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Escalate { reason } => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for AuditVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Retry { .. } => write!(f, "RETRY"),
            Self::Escalate { .. } => write!(f, "ESCALATE"),
        }
    }
}

/// Parse the auditor's raw reply.
///
/// The first line starting with `RETRY:` or `ESCALATE:` decides, even if a
/// `PASS` line appears elsewhere. Otherwise a line that is exactly `PASS`
/// passes. Anything else is a retry quoting the start of the reply.
#[must_use]
pub fn parse_verdict(output: &str) -> AuditVerdict {
    let lines: Vec<&str> = output.lines().collect();

    for (index, line) in lines.iter().enumerate() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix(RETRY_PREFIX) {
            let feedback = payload(rest, &lines[index + 1..]);
            return AuditVerdict::Retry {
                feedback: non_empty(feedback, "Auditor requested a retry without feedback"),
            };
        }
        if let Some(rest) = line.strip_prefix(ESCALATE_PREFIX) {
            let reason = payload(rest, &lines[index + 1..]);
            return AuditVerdict::Escalate {
                reason: non_empty(reason, "Auditor escalated without a reason"),
            };
        }
    }

    if lines.iter().any(|line| line.trim() == PASS_LINE) {
        return AuditVerdict::Pass;
    }

    let excerpt: String = output.chars().take(UNCLEAR_EXCERPT_CHARS).collect();
    AuditVerdict::Retry {
        feedback: format!("Auditor output was unclear. Raw output: {excerpt}"),
    }
}

/// Rest of the marker line plus every following line, cut at the first fence.
fn payload(first: &str, following: &[&str]) -> String {
    let mut text = first.to_string();
    for line in following {
        text.push('\n');
        text.push_str(line);
    }
    if let Some(fence) = text.find(CODE_FENCE) {
        text.truncate(fence);
    }
    text.trim().to_string()
}

fn non_empty(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// Runs the auditor agent once per validated iteration.
pub struct AuditorPhase<'a> {
    agent: &'a dyn AgentInvoker,
    template: &'a PromptTemplate,
    timeout: Duration,
}

impl<'a> AuditorPhase<'a> {
    pub fn new(agent: &'a dyn AgentInvoker, template: &'a PromptTemplate, timeout: Duration) -> Self {
        Self {
            agent,
            template,
            timeout,
        }
    }

    /// Audit `diff` against `spec`. A failed invocation is a retry, never an
    /// escalation.
    pub async fn audit(&self, spec: &str, diff: &str, working_dir: &Path) -> AuditVerdict {
        let prompt = build_audit_prompt(self.template, spec, diff);
        let output = self.agent.invoke(&prompt, self.timeout, working_dir).await;

        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                format!("agent exited with code {}", output.exit_code)
            } else {
                output.stderr.trim().to_string()
            };
            warn!(exit_code = output.exit_code, "Auditor invocation failed");
            return AuditVerdict::Retry {
                feedback: format!("Auditor invocation failed: {detail}"),
            };
        }

        let verdict = parse_verdict(&output.stdout);
        debug!(verdict = %verdict, "Audit complete");
        verdict
    }
}
