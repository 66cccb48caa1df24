//! Prompt templates and placeholder substitution.
//!
//! Templates are plain Markdown files with `{{name}}` placeholders. Rendering
//! is a single pass over the template text, so placeholder-like text inside a
//! substituted value (an error message quoting `{{goal}}`, say) is never
//! expanded a second time.
//!
//! # Example
//!
//! ```
//! use vralph::prompt::templates::{PromptTemplate, TemplateMarker};
//! use std::collections::HashMap;
//!
//! let template = PromptTemplate::from_text("coder", "Goal: {{goal}}\n{{criteria}}");
//! assert!(template.markers().contains(&TemplateMarker::Goal));
//!
//! let values = HashMap::from([(TemplateMarker::Goal, "US-1: Login".to_string())]);
//! assert_eq!(template.render(&values), "Goal: US-1: Login\n{{criteria}}");
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{Result, VRalphError};

/// Placeholders understood by the built-in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateMarker {
    /// Story id, title, description and any previous-iteration failure.
    Goal,
    /// Acceptance criteria as a bullet list.
    Criteria,
    /// Files the coder may edit.
    Files,
    /// Learnings from the progress log.
    Learnings,
    /// Story specification shown to the auditor.
    Spec,
    /// Code changes shown to the auditor.
    Diff,
}

impl TemplateMarker {
    /// The name between the braces.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Criteria => "criteria",
            Self::Files => "files",
            Self::Learnings => "learnings",
            Self::Spec => "spec",
            Self::Diff => "diff",
        }
    }

    /// The placeholder as written in a template, e.g. `{{goal}}`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{{{{{}}}}}", self.name())
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "goal" => Some(Self::Goal),
            "criteria" => Some(Self::Criteria),
            "files" => Some(Self::Files),
            "learnings" => Some(Self::Learnings),
            "spec" => Some(Self::Spec),
            "diff" => Some(Self::Diff),
            _ => None,
        }
    }
}

impl std::fmt::Display for TemplateMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is valid"))
}

/// A loaded template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    content: String,
}

impl PromptTemplate {
    /// Load a template. `phase` names the template in the error if it is
    /// missing, e.g. "Coder".
    pub fn load(phase: &str, path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self {
                name: phase.to_string(),
                content,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VRalphError::prompt_missing(phase, path))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Known markers present in the template, in order of first appearance.
    #[must_use]
    pub fn markers(&self) -> Vec<TemplateMarker> {
        let mut found = Vec::new();
        for caps in placeholder_regex().captures_iter(&self.content) {
            if let Some(marker) = TemplateMarker::from_name(&caps[1]) {
                if !found.contains(&marker) {
                    found.push(marker);
                }
            }
        }
        found
    }

    /// Substitute every placeholder that has a value; leave the rest as is.
    #[must_use]
    pub fn render(&self, values: &HashMap<TemplateMarker, String>) -> String {
        placeholder_regex()
            .replace_all(&self.content, |caps: &Captures<'_>| {
                TemplateMarker::from_name(&caps[1])
                    .and_then(|marker| values.get(&marker))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Default coder prompt written by `vralph init`.
pub const DEFAULT_CODER_TEMPLATE: &str = r"# Coder

You are implementing a single user story in this repository.

## Goal

{{goal}}

## Acceptance Criteria

{{criteria}}

## Files You May Edit

{{files}}

## Learnings From Previous Stories

{{learnings}}

## Rules

- Implement only what the acceptance criteria require.
- Edit only the files listed above unless no whitelist is given.
- Keep the project's existing style and conventions.
- Do not commit; the harness commits for you after verification.
- When you are done, stop. Verification runs automatically.
";

/// Default auditor prompt written by `vralph init`.
pub const DEFAULT_AUDITOR_TEMPLATE: &str = r"# Auditor

You are an independent reviewer. You have not seen the coding session.
Decide whether the diff below genuinely implements the specification.
A green build is not proof: look for stubbed logic, skipped criteria and
tests that assert nothing.

## Specification

{{spec}}

## Diff

```diff
{{diff}}
```

## Verdict

Reply with exactly one of the following, on its own line:

PASS

RETRY: <what is missing or wrong, specific enough to fix>

ESCALATE: <why a human must decide; only for genuine ambiguity in the specification>
";

/// Result of writing one default file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Created,
    Overwritten,
    /// Already present and `force` was not set.
    Kept,
}

/// Write `content` to `path` unless it exists and `force` is false.
pub fn write_default(path: &Path, content: &str, force: bool) -> Result<WriteStatus> {
    let existed = path.exists();
    if existed && !force {
        return Ok(WriteStatus::Kept);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(if existed {
        WriteStatus::Overwritten
    } else {
        WriteStatus::Created
    })
}

/// Write both default templates. Returns each path with what happened to it.
pub fn write_defaults(
    coder_path: &Path,
    auditor_path: &Path,
    force: bool,
) -> Result<Vec<(PathBuf, WriteStatus)>> {
    Ok(vec![
        (
            coder_path.to_path_buf(),
            write_default(coder_path, DEFAULT_CODER_TEMPLATE, force)?,
        ),
        (
            auditor_path.to_path_buf(),
            write_default(auditor_path, DEFAULT_AUDITOR_TEMPLATE, force)?,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Marker tests
    // =========================================================================

    #[test]
    fn test_marker_tag() {
        assert_eq!(TemplateMarker::Goal.tag(), "{{goal}}");
        assert_eq!(TemplateMarker::Diff.to_string(), "{{diff}}");
        assert_eq!(TemplateMarker::from_name("spec"), Some(TemplateMarker::Spec));
        assert_eq!(TemplateMarker::from_name("GOAL"), None);
    }

    #[test]
    fn test_default_templates_have_markers() {
        let coder = PromptTemplate::from_text("Coder", DEFAULT_CODER_TEMPLATE);
        assert_eq!(
            coder.markers(),
            vec![
                TemplateMarker::Goal,
                TemplateMarker::Criteria,
                TemplateMarker::Files,
                TemplateMarker::Learnings
            ]
        );

        let auditor = PromptTemplate::from_text("Auditor", DEFAULT_AUDITOR_TEMPLATE);
        assert_eq!(auditor.markers(), vec![TemplateMarker::Spec, TemplateMarker::Diff]);
    }

    // =========================================================================
    // Rendering tests
    // =========================================================================

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let template = PromptTemplate::from_text("t", "{{goal}} / {{goal}}");
        let values = HashMap::from([(TemplateMarker::Goal, "X".to_string())]);
        assert_eq!(template.render(&values), "X / X");
    }

    #[test]
    fn test_render_is_single_pass() {
        let template = PromptTemplate::from_text("t", "{{goal}}\n{{files}}");
        let values = HashMap::from([
            (TemplateMarker::Goal, "error mentions {{files}}".to_string()),
            (TemplateMarker::Files, "- a.py".to_string()),
        ]);
        assert_eq!(template.render(&values), "error mentions {{files}}\n- a.py");
    }

    #[test]
    fn test_render_keeps_unknown_placeholders() {
        let template = PromptTemplate::from_text("t", "{{unknown}} {{spec}}");
        let values = HashMap::from([(TemplateMarker::Spec, "S".to_string())]);
        assert_eq!(template.render(&values), "{{unknown}} S");
    }

    // =========================================================================
    // Loading and writing
    // =========================================================================

    #[test]
    fn test_load_missing_template() {
        let temp = TempDir::new().unwrap();
        let err = PromptTemplate::load("Coder", &temp.path().join("coder.md")).unwrap_err();
        assert!(matches!(err, VRalphError::PromptTemplateMissing { .. }));
        assert!(err.to_string().starts_with("Coder prompt not found:"));
    }

    #[test]
    fn test_write_defaults_respects_force() {
        let temp = TempDir::new().unwrap();
        let coder = temp.path().join("prompts/coder.md");
        let auditor = temp.path().join("prompts/auditor.md");

        let first = write_defaults(&coder, &auditor, false).unwrap();
        assert!(first.iter().all(|(_, s)| *s == WriteStatus::Created));

        fs::write(&coder, "custom").unwrap();
        let second = write_defaults(&coder, &auditor, false).unwrap();
        assert!(second.iter().all(|(_, s)| *s == WriteStatus::Kept));
        assert_eq!(fs::read_to_string(&coder).unwrap(), "custom");

        let forced = write_defaults(&coder, &auditor, true).unwrap();
        assert!(forced.iter().all(|(_, s)| *s == WriteStatus::Overwritten));
        assert_eq!(fs::read_to_string(&coder).unwrap(), DEFAULT_CODER_TEMPLATE);
    }
}
