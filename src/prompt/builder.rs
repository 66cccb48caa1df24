//! Section generators for the coder and auditor prompts.
//!
//! # Example
//!
//! ```
//! use vralph::prd::Story;
//! use vralph::prompt::builder::SectionBuilder;
//!
//! let story = Story::new("US-1", "Add login", "Users can log in.")
//!     .with_criteria(["Form validates email"]);
//! assert_eq!(SectionBuilder::criteria(&story), "- Form validates email");
//! assert!(SectionBuilder::goal(&story, None).starts_with("US-1: Add login"));
//! ```

use std::collections::HashMap;

use tracing::debug;

use super::templates::{PromptTemplate, TemplateMarker};
use crate::prd::{estimate_tokens, Story};

/// Shown when a story has no file whitelist.
pub const NO_WHITELIST: &str = "(No whitelist specified - use judgment)";

/// Shown when the progress log holds nothing yet.
pub const NO_LEARNINGS: &str = "(No previous learnings available)";

/// Heading of the failure block appended to the goal on retries.
pub const PREVIOUS_FAILURE_HEADING: &str = "## Previous Iteration Failed";

/// Builds the text substituted for each template marker.
pub struct SectionBuilder;

impl SectionBuilder {
    /// Story id, title and description. A failure from the previous
    /// iteration is appended verbatim inside a fenced block.
    #[must_use]
    pub fn goal(story: &Story, error_context: Option<&str>) -> String {
        let mut goal = format!("{}: {}\n\n{}", story.id, story.title, story.description);
        if let Some(error) = error_context.filter(|e| !e.trim().is_empty()) {
            goal.push_str(&format!(
                "\n\n{PREVIOUS_FAILURE_HEADING}\n\n\
                 The previous attempt failed with the following error:\n\n\
                 ```\n{error}\n```\n\n\
                 Please fix the issues and try again."
            ));
        }
        goal
    }

    #[must_use]
    pub fn criteria(story: &Story) -> String {
        bullet_list(&story.acceptance_criteria)
    }

    #[must_use]
    pub fn files(whitelist: Option<&[String]>) -> String {
        match whitelist {
            Some(files) => bullet_list(files),
            None => NO_WHITELIST.to_string(),
        }
    }

    #[must_use]
    pub fn learnings(learnings: &str) -> String {
        if learnings.trim().is_empty() {
            NO_LEARNINGS.to_string()
        } else {
            learnings.to_string()
        }
    }

    /// What the auditor checks the diff against. Contains nothing from the
    /// coder session.
    #[must_use]
    pub fn audit_spec(story: &Story) -> String {
        let mut spec = format!("{}: {}\n\n{}", story.id, story.title, story.description);
        if !story.acceptance_criteria.is_empty() {
            spec.push_str("\n\nAcceptance Criteria:\n");
            spec.push_str(&bullet_list(&story.acceptance_criteria));
        }
        spec
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inputs for one coder prompt.
#[derive(Debug, Clone, Copy)]
pub struct CoderPromptInput<'a> {
    pub story: &'a Story,
    pub whitelist: Option<&'a [String]>,
    pub learnings: &'a str,
    pub error_context: Option<&'a str>,
}

/// Render the coder template for one iteration.
#[must_use]
pub fn build_coder_prompt(template: &PromptTemplate, input: &CoderPromptInput<'_>) -> String {
    let values = HashMap::from([
        (
            TemplateMarker::Goal,
            SectionBuilder::goal(input.story, input.error_context),
        ),
        (TemplateMarker::Criteria, SectionBuilder::criteria(input.story)),
        (TemplateMarker::Files, SectionBuilder::files(input.whitelist)),
        (
            TemplateMarker::Learnings,
            SectionBuilder::learnings(input.learnings),
        ),
    ]);
    let prompt = template.render(&values);
    debug!(
        story = %input.story.id,
        tokens = estimate_tokens(&prompt),
        retry = input.error_context.is_some(),
        "Built coder prompt"
    );
    prompt
}

/// Render the auditor template from the spec and diff only.
#[must_use]
pub fn build_audit_prompt(template: &PromptTemplate, spec: &str, diff: &str) -> String {
    let values = HashMap::from([
        (TemplateMarker::Spec, spec.to_string()),
        (TemplateMarker::Diff, diff.to_string()),
    ]);
    template.render(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::templates::DEFAULT_CODER_TEMPLATE;

    fn story() -> Story {
        Story::new("US-007", "Sum helper", "Add a sum function.")
            .with_criteria(["Returns the sum", "Has a docstring"])
    }

    // =========================================================================
    // Section tests
    // =========================================================================

    #[test]
    fn test_goal_without_error() {
        let goal = SectionBuilder::goal(&story(), None);
        assert_eq!(goal, "US-007: Sum helper\n\nAdd a sum function.");
        assert!(!goal.contains(PREVIOUS_FAILURE_HEADING));
    }

    #[test]
    fn test_goal_with_error_is_verbatim() {
        let error = "FAILED tests/test_sum.py::test_sum - assert 3 == 4";
        let goal = SectionBuilder::goal(&story(), Some(error));
        assert!(goal.contains(PREVIOUS_FAILURE_HEADING));
        assert!(goal.contains(&format!("```\n{error}\n```")));
    }

    #[test]
    fn test_goal_ignores_blank_error() {
        let goal = SectionBuilder::goal(&story(), Some("  \n"));
        assert!(!goal.contains(PREVIOUS_FAILURE_HEADING));
    }

    #[test]
    fn test_files_section() {
        assert_eq!(SectionBuilder::files(None), NO_WHITELIST);
        let files = vec!["a.py".to_string(), "b.py".to_string()];
        assert_eq!(SectionBuilder::files(Some(&files)), "- a.py\n- b.py");
    }

    #[test]
    fn test_learnings_section() {
        assert_eq!(SectionBuilder::learnings(""), NO_LEARNINGS);
        assert_eq!(SectionBuilder::learnings("- use pathlib"), "- use pathlib");
    }

    #[test]
    fn test_audit_spec_has_criteria() {
        let spec = SectionBuilder::audit_spec(&story());
        assert!(spec.starts_with("US-007: Sum helper"));
        assert!(spec.contains("Acceptance Criteria:\n- Returns the sum\n- Has a docstring"));
    }

    // =========================================================================
    // Prompt assembly
    // =========================================================================

    #[test]
    fn test_build_coder_prompt_fills_every_marker() {
        let template = PromptTemplate::from_text("Coder", DEFAULT_CODER_TEMPLATE);
        let story = story();
        let prompt = build_coder_prompt(
            &template,
            &CoderPromptInput {
                story: &story,
                whitelist: None,
                learnings: "",
                error_context: Some("missing docstring"),
            },
        );

        assert!(!prompt.contains("{{"));
        assert!(prompt.contains("- Has a docstring"));
        assert!(prompt.contains(NO_WHITELIST));
        assert!(prompt.contains(NO_LEARNINGS));
        assert!(prompt.contains("missing docstring"));
    }

    #[test]
    fn test_build_audit_prompt() {
        let template = PromptTemplate::from_text("Auditor", "S={{spec}} D={{diff}}");
        assert_eq!(build_audit_prompt(&template, "spec", "+x"), "S=spec D=+x");
    }
}
