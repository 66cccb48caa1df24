//! Pre-flight validation for `vralph run --dry-run`.
//!
//! Every check runs even after an earlier one fails, so a single dry run
//! reports everything that needs fixing.
//!
//! # Example
//!
//! ```rust,ignore
//! use vralph::config::{DryRunValidator, ProjectConfig};
//! use std::path::Path;
//!
//! let project = Path::new("/path/to/project");
//! let config = ProjectConfig::load(project)?;
//! let report = DryRunValidator::new(project, project.join("prd.json"), &config).validate();
//!
//! for check in &report.checks {
//!     println!("{}", check.display_line());
//! }
//! std::process::exit(report.exit_code());
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use super::ProjectConfig;

/// Verification commands a runnable PRD must define.
pub const REQUIRED_VERIFICATION_COMMANDS: [&str; 2] = ["typecheck", "test"];

/// Outcome of one pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl ValidationCheck {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }

    /// `✓ name: message` or `✗ name: message`.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mark = if self.passed { "\u{2713}" } else { "\u{2717}" };
        format!("{} {}: {}", mark, self.name, self.message)
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every check passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Returns 0 if valid, 1 if any check failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let total = self.checks.len();
        if self.is_valid() {
            format!("All {total} checks passed")
        } else {
            format!("{} of {} checks failed", self.failed_count(), total)
        }
    }
}

/// Runs the dry-run checks against a project directory.
pub struct DryRunValidator<'a> {
    project_dir: PathBuf,
    prd_path: PathBuf,
    config: &'a ProjectConfig,
}

impl<'a> DryRunValidator<'a> {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        prd_path: impl Into<PathBuf>,
        config: &'a ProjectConfig,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            prd_path: prd_path.into(),
            config,
        }
    }

    /// Run every check in order.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        report.checks.push(self.check_prd_exists());
        let (json_check, prd) = self.check_prd_valid_json();
        report.checks.push(json_check);
        report.checks.push(self.check_git_repo());
        report.checks.push(check_verification_commands(prd.as_ref()));
        report.checks.push(check_template(
            "Coder prompt template",
            &ProjectConfig::resolve_path(&self.project_dir, &self.config.coder_prompt_path),
        ));
        if self.config.audit.enabled {
            report.checks.push(check_template(
                "Auditor prompt template",
                &ProjectConfig::resolve_path(&self.project_dir, &self.config.audit.prompt_path),
            ));
        }
        report.checks.push(check_agent_on_path(&self.config.agent.command));

        tracing::debug!(
            checks = report.checks.len(),
            failed = report.failed_count(),
            "Dry-run validation finished"
        );
        report
    }

    fn check_prd_exists(&self) -> ValidationCheck {
        const NAME: &str = "PRD file exists";
        if self.prd_path.is_file() {
            ValidationCheck::pass(NAME, format!("Found {}", self.prd_path.display()))
        } else {
            ValidationCheck::fail(NAME, format!("File not found: {}", self.prd_path.display()))
        }
    }

    fn check_prd_valid_json(&self) -> (ValidationCheck, Option<serde_json::Value>) {
        const NAME: &str = "PRD is valid JSON";
        let content = match std::fs::read_to_string(&self.prd_path) {
            Ok(content) => content,
            Err(_) => {
                return (
                    ValidationCheck::fail(NAME, "Cannot check - file not found"),
                    None,
                )
            }
        };

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => (ValidationCheck::pass(NAME, "Valid JSON structure"), Some(value)),
            Err(e) => (
                ValidationCheck::fail(
                    NAME,
                    format!("Invalid JSON at line {}: {}", e.line(), e),
                ),
                None,
            ),
        }
    }

    fn check_git_repo(&self) -> ValidationCheck {
        const NAME: &str = "Git repository exists";
        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&self.project_dir)
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let git_dir = String::from_utf8_lossy(&out.stdout).trim().to_string();
                ValidationCheck::pass(NAME, format!("Found git directory: {git_dir}"))
            }
            Ok(_) => ValidationCheck::fail(NAME, "Not a git repository (or any parent)"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ValidationCheck::fail(NAME, "Git command not found")
            }
            Err(e) => ValidationCheck::fail(NAME, format!("Error checking git: {e}")),
        }
    }
}

fn check_verification_commands(prd: Option<&serde_json::Value>) -> ValidationCheck {
    const NAME: &str = "Verification commands set";
    let Some(prd) = prd else {
        return ValidationCheck::fail(NAME, "Cannot check - PRD not loaded");
    };

    let commands = match prd.get("verificationCommands").and_then(|v| v.as_object()) {
        Some(map) if !map.is_empty() => map,
        _ => return ValidationCheck::fail(NAME, "No verificationCommands object in PRD"),
    };

    let missing: Vec<&str> = REQUIRED_VERIFICATION_COMMANDS
        .iter()
        .copied()
        .filter(|name| !commands.contains_key(*name))
        .collect();

    if missing.is_empty() {
        ValidationCheck::pass(
            NAME,
            format!("Found commands: {}", REQUIRED_VERIFICATION_COMMANDS.join(", ")),
        )
    } else {
        ValidationCheck::fail(
            NAME,
            format!("Missing verification commands: {}", missing.join(", ")),
        )
    }
}

fn check_template(name: &str, path: &Path) -> ValidationCheck {
    if path.is_file() {
        ValidationCheck::pass(name, format!("Found {}", path.display()))
    } else {
        ValidationCheck::fail(
            name,
            format!("Not found: {} (run 'vralph init')", path.display()),
        )
    }
}

fn check_agent_on_path(command: &str) -> ValidationCheck {
    const NAME: &str = "Agent command available";
    match which::which(command) {
        Ok(path) => ValidationCheck::pass(NAME, format!("Found {}", path.display())),
        Err(_) => ValidationCheck::fail(NAME, format!("'{command}' not found in PATH")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_prd(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("prd.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn find<'r>(report: &'r ValidationReport, name: &str) -> &'r ValidationCheck {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("missing check {name}"))
    }

    // =========================================================================
    // Report tests
    // =========================================================================

    #[test]
    fn test_empty_report_is_valid() {
        let report = ValidationReport::new();
        assert!(report.is_valid());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_report_summary_counts_failures() {
        let report = ValidationReport {
            checks: vec![
                ValidationCheck::pass("a", "ok"),
                ValidationCheck::fail("b", "bad"),
                ValidationCheck::fail("c", "bad"),
            ],
        };
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.summary(), "2 of 3 checks failed");
    }

    #[test]
    fn test_display_line_marks() {
        assert_eq!(
            ValidationCheck::pass("PRD file exists", "Found prd.json").display_line(),
            "\u{2713} PRD file exists: Found prd.json"
        );
        assert!(ValidationCheck::fail("x", "y").display_line().starts_with('\u{2717}'));
    }

    // =========================================================================
    // Check tests
    // =========================================================================

    #[test]
    fn test_missing_prd_fails_dependent_checks() {
        let temp = TempDir::new().unwrap();
        let config = ProjectConfig::default();
        let report =
            DryRunValidator::new(temp.path(), temp.path().join("prd.json"), &config).validate();

        assert!(!find(&report, "PRD file exists").passed);
        assert_eq!(
            find(&report, "PRD is valid JSON").message,
            "Cannot check - file not found"
        );
        assert_eq!(
            find(&report, "Verification commands set").message,
            "Cannot check - PRD not loaded"
        );
        assert!(!report.is_valid());
    }

    #[test]
    fn test_invalid_json_reported() {
        let temp = TempDir::new().unwrap();
        let prd = write_prd(temp.path(), "{ broken");
        let config = ProjectConfig::default();
        let report = DryRunValidator::new(temp.path(), prd, &config).validate();

        assert!(find(&report, "PRD file exists").passed);
        assert!(!find(&report, "PRD is valid JSON").passed);
    }

    #[test]
    fn test_missing_verification_command_named() {
        let temp = TempDir::new().unwrap();
        let prd = write_prd(
            temp.path(),
            r#"{"verificationCommands": {"typecheck": "mypy ."}}"#,
        );
        let config = ProjectConfig::default();
        let report = DryRunValidator::new(temp.path(), prd, &config).validate();

        let check = find(&report, "Verification commands set");
        assert!(!check.passed);
        assert_eq!(check.message, "Missing verification commands: test");
    }

    #[test]
    fn test_auditor_template_skipped_when_audit_disabled() {
        let temp = TempDir::new().unwrap();
        let mut config = ProjectConfig::default();
        config.audit.enabled = false;
        let report =
            DryRunValidator::new(temp.path(), temp.path().join("prd.json"), &config).validate();

        assert!(report.checks.iter().all(|c| c.name != "Auditor prompt template"));
        assert!(!find(&report, "Coder prompt template").passed);
    }

    #[test]
    fn test_templates_found() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("prompts")).unwrap();
        std::fs::write(temp.path().join("prompts/coder.md"), "{{goal}}").unwrap();
        std::fs::write(temp.path().join("prompts/auditor.md"), "{{diff}}").unwrap();
        let config = ProjectConfig::default();
        let report =
            DryRunValidator::new(temp.path(), temp.path().join("prd.json"), &config).validate();

        assert!(find(&report, "Coder prompt template").passed);
        assert!(find(&report, "Auditor prompt template").passed);
    }

    #[test]
    fn test_agent_not_on_path() {
        let check = check_agent_on_path("vralph-definitely-missing-agent-binary");
        assert!(!check.passed);
        assert!(check.message.contains("not found in PATH"));
    }

    #[test]
    fn test_agent_on_path() {
        let check = check_agent_on_path("sh");
        assert!(check.passed);
    }
}
