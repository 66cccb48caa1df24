//! End-of-run report.

use std::time::{Duration, Instant};

use crate::output::{truncate, OutputSink};
use crate::r#loop::state::{ExecutionOutput, ExecutionResult};

const FEEDBACK_EXCERPT_CHARS: usize = 120;

/// Format a duration as `12.3s`, `4m 5s` or `1h 2m 3s`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vralph::summary::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_millis(12_340)), "12.3s");
/// assert_eq!(format_elapsed(Duration::from_secs(245)), "4m 5s");
/// assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 2m 3s");
/// ```
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes < 60 {
        return format!("{minutes}m {seconds}s");
    }
    format!("{}h {}m {seconds}s", minutes / 60, minutes % 60)
}

/// Statistics collected over one `vralph run`.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub stories_attempted: u32,
    pub stories_passed: u32,
    pub stories_failed: u32,
    pub total_iterations: u32,
    pub files_changed: usize,
    pub commits: Vec<String>,
    /// `(story id, reason)`.
    pub escalated: Vec<(String, String)>,
    /// `(story id, iteration, feedback)` for every failed iteration.
    pub retry_history: Vec<(String, u32, String)>,
    started: Instant,
    elapsed: Option<Duration>,
}

impl Default for ExecutionSummary {
    fn default() -> Self {
        Self {
            stories_attempted: 0,
            stories_passed: 0,
            stories_failed: 0,
            total_iterations: 0,
            files_changed: 0,
            commits: Vec::new(),
            escalated: Vec::new(),
            retry_history: Vec::new(),
            started: Instant::now(),
            elapsed: None,
        }
    }
}

impl ExecutionSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one terminal outcome.
    pub fn record(&mut self, output: &ExecutionOutput) {
        self.stories_attempted += 1;
        self.total_iterations += output.iterations;
        match output.result {
            ExecutionResult::Success => self.stories_passed += 1,
            ExecutionResult::Failed => self.stories_failed += 1,
            ExecutionResult::Escalated => self.escalated.push((
                output.story_id.clone(),
                output.escalation_reason.clone().unwrap_or_default(),
            )),
        }
        for (iteration, feedback) in output.retry_history() {
            self.retry_history
                .push((output.story_id.clone(), iteration, feedback.to_string()));
        }
    }

    pub fn add_commit(&mut self, sha: impl Into<String>, files: usize) {
        self.commits.push(sha.into());
        self.files_changed += files;
    }

    pub fn finish(&mut self) {
        self.elapsed = Some(self.started.elapsed());
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    #[must_use]
    pub fn stories_escalated(&self) -> usize {
        self.escalated.len()
    }

    /// 2 if anything escalated, 1 if anything failed, else 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if !self.escalated.is_empty() {
            2
        } else if self.stories_failed > 0 {
            1
        } else {
            0
        }
    }

    #[must_use]
    pub fn lines(&self, verbose: bool) -> Vec<String> {
        let mut lines = vec![
            format!("Stories attempted: {}", self.stories_attempted),
            format!("Stories passed:    {}", self.stories_passed),
            format!("Stories failed:    {}", self.stories_failed),
            format!("Stories escalated: {}", self.stories_escalated()),
            String::new(),
            format!("Total iterations:  {}", self.total_iterations),
            format!("Time elapsed:      {}", format_elapsed(self.elapsed())),
            String::new(),
            format!("Files changed:     {}", self.files_changed),
            format!("Commits made:      {}", self.commits.len()),
        ];
        lines.extend(self.commits.iter().map(|sha| format!("  - {sha}")));

        if !self.escalated.is_empty() {
            lines.push(String::new());
            lines.push("Escalated stories:".to_string());
            lines.extend(
                self.escalated
                    .iter()
                    .map(|(id, reason)| format!("  - {id}: {reason}")),
            );
        }

        if verbose && !self.retry_history.is_empty() {
            lines.push(String::new());
            lines.push("Retry history:".to_string());
            lines.extend(self.retry_history.iter().map(|(id, iteration, feedback)| {
                format!(
                    "  - {id} #{iteration}: {}",
                    truncate(feedback, FEEDBACK_EXCERPT_CHARS)
                )
            }));
        }
        lines
    }

    pub fn display(&self, output: &dyn OutputSink, verbose: bool) {
        output.header("Execution Summary");
        let failed = self.stories_failed > 0 || !self.escalated.is_empty();
        for line in &self.lines(verbose) {
            if failed {
                output.error(line);
            } else if self.stories_passed > 0 {
                output.success(line);
            } else {
                output.info(line);
            }
        }
    }
}
