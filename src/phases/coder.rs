//! The coding phase: render the prompt, run the agent once.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::process::ProcessOutput;
use crate::prompt::{build_coder_prompt, CoderPromptInput, PromptTemplate};
use crate::testing::AgentInvoker;

/// What one coder call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoderOutcome {
    Completed { output: ProcessOutput },
    /// `error` becomes the next iteration's error context.
    Failed { error: String, output: ProcessOutput },
}

impl CoderOutcome {
    fn from_output(output: ProcessOutput) -> Self {
        if output.success() {
            return Self::Completed { output };
        }
        let error = if output.stderr.trim().is_empty() {
            format!("Coder exited with code {}", output.exit_code)
        } else {
            output.stderr.clone()
        };
        Self::Failed { error, output }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub fn output(&self) -> &ProcessOutput {
        match self {
            Self::Completed { output } | Self::Failed { output, .. } => output,
        }
    }
}

pub struct CoderPhase<'a> {
    agent: &'a dyn AgentInvoker,
    template: &'a PromptTemplate,
    timeout: Duration,
}

impl<'a> CoderPhase<'a> {
    pub fn new(agent: &'a dyn AgentInvoker, template: &'a PromptTemplate, timeout: Duration) -> Self {
        Self {
            agent,
            template,
            timeout,
        }
    }

    pub async fn run(&self, input: &CoderPromptInput<'_>, working_dir: &Path) -> CoderOutcome {
        let prompt = build_coder_prompt(self.template, input);
        let output = self.agent.invoke(&prompt, self.timeout, working_dir).await;
        debug!(
            story = %input.story.id,
            exit_code = output.exit_code,
            stdout_chars = output.stdout.len(),
            "Coder finished"
        );
        CoderOutcome::from_output(output)
    }
}
