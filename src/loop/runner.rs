//! Multi-story orchestration for `vralph run`.
//!
//! The runner owns everything around the executor: the git pre-flight, story
//! selection, learnings, and what happens after a terminal result (commit,
//! PRD update, progress entry, circuit-breaker policy, summary).

use std::path::PathBuf;

use chrono::Local;
use tracing::{info, warn};

use super::config::ExecutorConfig;
use super::executor::{ExecutorDependencies, StoryExecutor};
use super::state::{ExecutionOutput, ExecutionResult};
use crate::config::{CircuitBreakerPolicy, PhaseTimeouts, ProjectConfig, TimeoutOverrides};
use crate::error::{Result, VRalphError};
use crate::git::{check_repository, CommitOutcome};
use crate::output::truncate;
use crate::prd::{Prd, SizeIndicator, Story};
use crate::progress::{ProgressEntry, ProgressLog};
use crate::summary::ExecutionSummary;

const PROGRESS_EXCERPT_CHARS: usize = 300;

/// Options from the `run` command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run exactly this story.
    pub story_id: Option<String>,
    /// Keep going through every pending story.
    pub all: bool,
    /// Proceed despite unsafe git state, still reporting it.
    pub allow_dirty: bool,
    pub no_audit: bool,
    pub max_retries: Option<u32>,
    pub timeouts: TimeoutOverrides,
    pub verbose: bool,
}

/// Runs selected stories one after another.
pub struct StoryRunner {
    project_dir: PathBuf,
    prd_path: PathBuf,
    config: ProjectConfig,
    executor: StoryExecutor,
}

impl StoryRunner {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        prd_path: impl Into<PathBuf>,
        config: ProjectConfig,
        deps: ExecutorDependencies,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            prd_path: prd_path.into(),
            config,
            executor: StoryExecutor::new(deps),
        }
    }

    /// Run the stories `options` select and return the summary.
    ///
    /// # Errors
    ///
    /// Returns an error for unsafe git state without `allow_dirty`, an
    /// unreadable PRD, an unknown story id, invalid settings, a missing prompt
    /// template, or a failure to write the PRD or progress log.
    pub async fn run(&self, options: &RunOptions) -> Result<ExecutionSummary> {
        let out = self.executor.deps().output.clone();
        let mut summary = ExecutionSummary::new();

        if options.max_retries == Some(0) {
            return Err(VRalphError::invalid_config(
                "max-retries",
                "must be at least 1",
            ));
        }
        options.timeouts.validate("timeouts")?;
        let timeouts = PhaseTimeouts::resolve(&options.timeouts, &self.config.timeouts);

        self.check_git_safety(options.allow_dirty)?;

        let mut prd = Prd::load(&self.prd_path)?;
        let selected = select_stories(&prd, options)?;
        if selected.is_empty() {
            out.success("All stories are complete!");
            summary.finish();
            return Ok(summary);
        }

        let progress = ProgressLog::new(ProjectConfig::resolve_path(
            &self.project_dir,
            &self.config.progress_path,
        ));
        let validation_command = prd.verification_commands.combined();

        for (index, story_id) in selected.iter().enumerate() {
            let story = prd.find_story(story_id)?.clone();
            out.header(&format!("Running story: [{}] {}", story.id, story.title));
            if story.passes {
                out.warning(&format!("{} is already marked as passing", story.id));
            }
            if SizeIndicator::for_tokens(story.estimate_tokens()) == SizeIndicator::TooLarge {
                out.warning(&format!(
                    "{} is very large (~{} tokens); consider splitting it",
                    story.id,
                    story.estimate_tokens()
                ));
            }

            let learnings = progress.load(self.config.max_history)?.render();
            let config = self
                .executor_config(&story, options, timeouts)
                .with_validation_command(validation_command.clone())
                .with_learnings(learnings);

            let output = self.executor.execute(&story, &config).await?;
            let commit = self.apply_outcome(&mut prd, &story, &config, &output)?;
            if let Some(CommitOutcome::Committed { sha, files }) = &commit {
                summary.add_commit(short(sha), files.len());
            }
            summary.record(&output);
            progress.append_entry(&progress_entry(&story, &output, commit.as_ref()))?;

            let remaining = selected.len() - index - 1;
            if !output.is_success() && remaining > 0 {
                match self.config.on_circuit_breaker {
                    CircuitBreakerPolicy::Stop => {
                        out.warning(&format!(
                            "Stopping run after {} ({remaining} story(ies) not attempted)",
                            output.result
                        ));
                        break;
                    }
                    CircuitBreakerPolicy::Continue => {
                        out.info("Continuing with the next pending story");
                    }
                }
            }
        }

        summary.finish();
        summary.display(out.as_ref(), options.verbose);
        Ok(summary)
    }

    fn check_git_safety(&self, allow_dirty: bool) -> Result<()> {
        let out = &self.executor.deps().output;
        let report = check_repository(self.executor.deps().git.as_ref());
        for check in &report.checks {
            if check.is_unsafe {
                out.error(&format!("\u{2717} {}", check.message));
            } else {
                out.info(&format!("\u{2713} {}", check.message));
            }
        }

        let findings = report.enforce(allow_dirty)?;
        if !findings.is_empty() {
            warn!(count = findings.len(), "Proceeding despite unsafe git state");
            out.warning(&format!(
                "Proceeding with --allow-dirty despite: {}",
                findings.join("; ")
            ));
        }
        Ok(())
    }

    fn executor_config(
        &self,
        story: &Story,
        options: &RunOptions,
        timeouts: PhaseTimeouts,
    ) -> ExecutorConfig {
        let resolve = |path: &PathBuf| ProjectConfig::resolve_path(&self.project_dir, path);
        ExecutorConfig::new(&self.project_dir)
            .with_max_retries(options.max_retries.unwrap_or(self.config.max_retries))
            .with_coder_prompt(resolve(&self.config.coder_prompt_path))
            .with_auditor_prompt(resolve(&self.config.audit.prompt_path))
            .with_whitelist(
                story
                    .files_whitelist
                    .clone()
                    .or_else(|| self.config.files_whitelist.clone()),
            )
            .with_timeouts(timeouts)
            .with_audit(self.config.audit.enabled && !options.no_audit)
    }

    /// Commit on success, park on escalation, count the attempt, save once.
    fn apply_outcome(
        &self,
        prd: &mut Prd,
        story: &Story,
        config: &ExecutorConfig,
        output: &ExecutionOutput,
    ) -> Result<Option<CommitOutcome>> {
        let out = &self.executor.deps().output;
        let mut commit = None;

        match output.result {
            ExecutionResult::Success => {
                out.success(&format!(
                    "{} passed after {} iteration(s)",
                    story.id, output.iterations
                ));
                let whitelist = config.files_whitelist.clone().unwrap_or_default();
                let outcome = self
                    .executor
                    .deps()
                    .git
                    .commit_story(&story.id, &story.title, &whitelist);
                match &outcome {
                    CommitOutcome::Committed { sha, files } => {
                        info!(story = %story.id, sha = %sha, files = files.len(), "Committed story");
                        out.success(&format!("Committed {} file(s) as {}", files.len(), short(sha)));
                    }
                    CommitOutcome::Failed(failure) => {
                        warn!(story = %story.id, %failure, "Commit failed");
                        out.warning(&format!("Commit skipped: {failure}"));
                    }
                }
                commit = Some(outcome);
                prd.mark_passed(&story.id)?;
            }
            ExecutionResult::Failed => {
                out.error(&format!(
                    "{} failed after {} iteration(s): {}",
                    story.id,
                    output.iterations,
                    truncate(output.last_error.as_deref().unwrap_or_default(), 200)
                ));
            }
            ExecutionResult::Escalated => {
                let reason = output.escalation_reason.clone().unwrap_or_default();
                out.error(&format!("{} escalated: {reason}", story.id));
                prd.mark_skipped(&story.id, &format!("escalated - {reason}"))?;
            }
        }

        prd.increment_attempts(&story.id)?;
        prd.save(&self.prd_path)?;
        Ok(commit)
    }
}

fn short(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Story ids to run, in order.
fn select_stories(prd: &Prd, options: &RunOptions) -> Result<Vec<String>> {
    if let Some(id) = &options.story_id {
        return Ok(vec![prd.find_story(id)?.id.clone()]);
    }
    let pending = prd.pending_stories();
    if options.all {
        Ok(pending.iter().map(|s| s.id.clone()).collect())
    } else {
        Ok(pending.first().map(|s| vec![s.id.clone()]).unwrap_or_default())
    }
}

fn progress_entry(
    story: &Story,
    output: &ExecutionOutput,
    commit: Option<&CommitOutcome>,
) -> ProgressEntry {
    let mut lines = vec![
        format!("Story: {}", single_line(&story.title)),
        format!(
            "Result: {} after {} iteration(s)",
            output.result, output.iterations
        ),
    ];
    match commit {
        Some(CommitOutcome::Committed { sha, .. }) => lines.push(format!("Commit: {}", short(sha))),
        Some(CommitOutcome::Failed(failure)) => {
            lines.push(format!("Commit: not made ({})", single_line(&failure.to_string())))
        }
        None => {}
    }
    if let Some(reason) = &output.escalation_reason {
        lines.push(format!("Escalation: {}", single_line(reason)));
    }
    let retries = output.retry_history();
    if !retries.is_empty() {
        lines.push("Retries:".to_string());
        for (iteration, feedback) in retries {
            let excerpt = single_line(&truncate(feedback, PROGRESS_EXCERPT_CHARS));
            lines.push(format!("- #{iteration}: {excerpt}"));
        }
    }
    ProgressEntry::new(Local::now().date_naive(), &story.id, lines.join("\n"))
}

/// Agent text folded onto one line so it cannot start a terminator or header.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
