//! Custom assertions for domain-specific testing.
//!
//! Provides expressive assertions for execution outcomes and agent prompts.

use super::mocks::ScriptedInvoker;
use crate::r#loop::state::{ExecutionOutput, ExecutionResult};

/// Assert that a story execution succeeded after `iterations` iterations.
///
/// # Panics
///
/// Panics with the full output if the result differs.
///
/// # Example
///
/// ```rust,ignore
/// let output = executor.execute(&story).await?;
/// assert_succeeded(&output, 1);
/// ```
pub fn assert_succeeded(output: &ExecutionOutput, iterations: u32) {
    assert_eq!(
        output.result,
        ExecutionResult::Success,
        "Expected SUCCESS, got {:?}.\nLast error: {:?}",
        output.result,
        output.last_error
    );
    assert_eq!(output.iterations, iterations, "Unexpected iteration count");
}

/// Assert that the circuit breaker ended the story after `iterations`.
///
/// # Panics
///
/// Panics if the result is not FAILED or the count differs.
pub fn assert_failed(output: &ExecutionOutput, iterations: u32) {
    assert_eq!(
        output.result,
        ExecutionResult::Failed,
        "Expected FAILED, got {:?}",
        output.result
    );
    assert_eq!(output.iterations, iterations, "Unexpected iteration count");
}

/// Assert that the story escalated with a reason containing `needle`.
///
/// # Panics
///
/// Panics if the result is not ESCALATED or the reason does not match.
pub fn assert_escalated(output: &ExecutionOutput, needle: &str) {
    assert_eq!(
        output.result,
        ExecutionResult::Escalated,
        "Expected ESCALATED, got {:?}",
        output.result
    );
    let reason = output.escalation_reason.as_deref().unwrap_or_default();
    assert!(
        reason.contains(needle),
        "Escalation reason {reason:?} does not contain {needle:?}"
    );
}

/// Assert that the agent's `index`-th prompt (0-based) contains `needle`.
///
/// # Panics
///
/// Panics if the prompt does not exist or lacks the text.
pub fn assert_prompt_contains(agent: &ScriptedInvoker, index: usize, needle: &str) {
    let prompts = agent.prompts();
    let prompt = prompts
        .get(index)
        .unwrap_or_else(|| panic!("Agent received only {} prompt(s)", prompts.len()));
    assert!(
        prompt.contains(needle),
        "Prompt #{index} does not contain {needle:?}:\n{prompt}"
    );
}
