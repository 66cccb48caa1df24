//! V-Ralph - story execution engine
//!
//! Command-line entry point. Everything beyond parsing and printing lives in
//! the library.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use vralph::config::{DryRunValidator, ProjectConfig, TimeoutOverrides};
use vralph::prd::{Prd, SizeIndicator};
use vralph::progress::{ProgressHealth, ProgressLog};
use vralph::prompt::templates::{write_defaults, WriteStatus};
use vralph::r#loop::{ExecutorDependencies, RunOptions, StoryRunner};

#[derive(Parser)]
#[command(name = "vralph")]
#[command(version)]
#[command(about = "Drive a coding agent through PRD stories with validation and audit", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// PRD file, relative to the project directory
    #[arg(long, global = true, default_value = "prd.json")]
    prd: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Trace-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute pending stories
    Run {
        /// Run only this story
        #[arg(long, conflicts_with = "all")]
        story: Option<String>,

        /// Run every pending story
        #[arg(long)]
        all: bool,

        /// Check the setup without invoking the agent
        #[arg(long)]
        dry_run: bool,

        /// Iterations allowed per story
        #[arg(long)]
        max_retries: Option<u32>,

        /// Skip the auditor phase
        #[arg(long)]
        no_audit: bool,

        /// Proceed despite uncommitted changes, unpushed commits or a detached HEAD
        #[arg(long)]
        allow_dirty: bool,

        /// Coder timeout in seconds
        #[arg(long)]
        coder_timeout: Option<u64>,

        /// Validation timeout in seconds
        #[arg(long)]
        validation_timeout: Option<u64>,

        /// Audit timeout in seconds
        #[arg(long)]
        audit_timeout: Option<u64>,
    },

    /// Show story status
    Status {
        /// Show token estimates per story
        #[arg(long)]
        estimate: bool,
    },

    /// Check the progress log
    Health,

    /// Write default prompt templates and a progress log
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.debug {
        "vralph=trace,debug"
    } else if cli.verbose {
        "vralph=debug,info"
    } else {
        "vralph=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.is_dir() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let prd_path = ProjectConfig::resolve_path(&project_path, &cli.prd);

    let code = match dispatch(cli, &project_path, &prd_path).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(hint) = e.suggestion() {
                eprintln!("{} {}", "Hint:".yellow(), hint);
            }
            e.exit_code()
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn dispatch(cli: Cli, project_path: &Path, prd_path: &Path) -> vralph::Result<i32> {
    match cli.command {
        Commands::Run {
            story,
            all,
            dry_run,
            max_retries,
            no_audit,
            allow_dirty,
            coder_timeout,
            validation_timeout,
            audit_timeout,
        } => {
            let mut config = ProjectConfig::load(project_path)?;
            if no_audit {
                config.audit.enabled = false;
            }

            if dry_run {
                return Ok(dry_run_report(project_path, prd_path, &config));
            }

            let options = RunOptions {
                story_id: story,
                all,
                allow_dirty,
                no_audit,
                max_retries,
                timeouts: TimeoutOverrides {
                    coder: coder_timeout,
                    validation: validation_timeout,
                    audit: audit_timeout,
                },
                verbose: cli.verbose,
            };

            let deps = ExecutorDependencies::real(project_path.to_path_buf(), &config);
            let runner = StoryRunner::new(project_path, prd_path, config, deps);
            let summary = runner.run(&options).await?;
            Ok(summary.exit_code())
        }

        Commands::Status { estimate } => {
            let prd = Prd::load(prd_path)?;
            print_status(&prd, estimate);
            Ok(0)
        }

        Commands::Health => {
            let config = ProjectConfig::load(project_path)?;
            let path = ProjectConfig::resolve_path(project_path, &config.progress_path);
            Ok(print_health(&path))
        }

        Commands::Init { force } => {
            let config = ProjectConfig::load(project_path)?;
            let resolve = |p: &Path| ProjectConfig::resolve_path(project_path, p);

            let mut written = write_defaults(
                &resolve(&config.coder_prompt_path),
                &resolve(&config.audit.prompt_path),
                force,
            )?;
            let progress_path = resolve(&config.progress_path);
            let status = ProgressLog::new(&progress_path).write_template(force)?;
            written.push((progress_path, status));

            println!("\n{} Project files", "Init:".cyan().bold());
            println!("{}", "─".repeat(40));
            for (path, status) in &written {
                let label = match status {
                    WriteStatus::Created => "Created".green(),
                    WriteStatus::Overwritten => "Overwrote".yellow(),
                    WriteStatus::Kept => "Kept".blue(),
                };
                println!("   {label} {}", path.display());
            }
            if written.iter().any(|(_, s)| *s == WriteStatus::Kept) {
                println!(
                    "\n{} Existing files were kept; use --force to overwrite",
                    "Info:".blue()
                );
            }
            Ok(0)
        }
    }
}

fn dry_run_report(project_path: &Path, prd_path: &Path, config: &ProjectConfig) -> i32 {
    let report = DryRunValidator::new(project_path, prd_path, config).validate();

    println!("\n{} Dry run", "Check:".cyan().bold());
    println!("{}", "─".repeat(40));
    for check in &report.checks {
        if check.passed {
            println!("   {}", check.display_line().green());
        } else {
            println!("   {}", check.display_line().red());
        }
    }
    println!();
    if report.is_valid() {
        println!("{} {}", "OK".green().bold(), report.summary());
    } else {
        println!("{} {}", "Error:".red().bold(), report.summary());
    }
    report.exit_code()
}

fn print_status(prd: &Prd, estimate: bool) {
    let name = if prd.project.is_empty() {
        "(unnamed project)"
    } else {
        prd.project.as_str()
    };
    println!("\n{} {}", "Project:".cyan().bold(), name);
    if !prd.branch_name.is_empty() {
        println!("   Branch: {}", prd.branch_name);
    }
    println!("{}", "─".repeat(40));

    for story in prd.stories_for_status() {
        let badge = if story.passes {
            "PASS".green().bold()
        } else if story.is_skipped() {
            "SKIP".yellow().bold()
        } else {
            "FAIL".red().bold()
        };
        let mut line = format!("   [{badge}] {}: {}", story.id, story.title);
        if estimate {
            let tokens = story.estimate_tokens();
            line.push_str(&format!(" (~{tokens} tokens)"));
            let size = SizeIndicator::for_tokens(tokens);
            if size != SizeIndicator::Normal {
                line.push_str(&format!(" {}", size.label().yellow()));
            }
        }
        println!("{line}");
    }

    let (total, passed, pending, skipped) = prd.counts();
    println!("{}", "─".repeat(40));
    println!(
        "   Total: {total} | Passed: {passed} | Pending: {pending} | Skipped: {skipped}"
    );
}

fn print_health(path: &Path) -> i32 {
    let health = ProgressHealth::check(path);

    println!("\n{} Progress log", "Health:".cyan().bold());
    println!("{}", "─".repeat(40));
    for check in health.checks(path) {
        if check.passed {
            println!("   {}", check.display_line().green());
        } else {
            println!("   {}", check.display_line().red());
        }
    }
    for error in &health.parse_errors {
        println!("      {}", error.dimmed());
    }

    if health.exists {
        println!();
        println!("   History entries: {}", health.history_count);
        println!("   Patterns: {}", health.patterns_count);
        println!("   Pattern tokens (est): {}", health.patterns_tokens);
        println!("   Total tokens (est): {}", health.total_tokens);
    }

    for warning in health.warnings() {
        println!("{} {}", "Warning:".yellow(), warning);
    }

    println!();
    if health.is_healthy() {
        println!("{} Progress log is healthy", "OK".green().bold());
    } else {
        println!("{} Progress log has issues", "Error:".red().bold());
    }
    health.exit_code()
}
