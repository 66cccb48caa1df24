//! Supervised child processes.
//!
//! Every external program V-Ralph runs (the coding agent, the auditor, the
//! validation command) goes through [`ProcessSupervisor`]. A call spawns
//! exactly one child, enforces a timeout, and never returns while that child
//! is still alive: on timeout it sends SIGTERM, waits a bounded grace period,
//! then SIGKILLs and reaps.
//!
//! On unix the child leads its own process group and signals go to the whole
//! group, so shells and their background jobs die with it. Group members that
//! outlive a normally exiting leader are killed before its output is read.
//!
//! Invoker-side failures are reported in-band with exit code `-1` and a
//! stable stderr prefix so callers can tell them apart without an error type:
//!
//! | Failure            | stderr                                        |
//! |--------------------|-----------------------------------------------|
//! | timeout            | `Timeout: Process killed after {N}s`          |
//!
//! `{N}` keeps fractional digits for sub-second timeouts (`0.3s`).
//! | binary not found   | `Error: '{program}' command not found in PATH` |
//! | anything else      | `Error: ...`                                  |

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{AgentConfig, PromptDelivery, DEFAULT_GRACE_SECS};
use crate::testing::traits::AgentInvoker;

/// Exit code reserved for failures on the invoking side.
pub const INVOKER_FAILURE_CODE: i32 = -1;

/// stderr prefix for a killed-on-timeout process.
pub const TIMEOUT_PREFIX: &str = "Timeout:";

/// stderr prefix for every other invoker-side failure.
pub const ERROR_PREFIX: &str = "Error:";

const NOT_FOUND_SUFFIX: &str = "command not found in PATH";

/// How long to keep draining pipes after the child exits. A grandchild that
/// inherited stdout can otherwise hold the read open indefinitely.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The (stdout, stderr, exit code) triple every invocation produces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// An invoker-side failure (`exit_code == -1`).
    pub fn invoker_failure(stderr: impl Into<String>) -> Self {
        Self::new(String::new(), stderr, INVOKER_FAILURE_CODE)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::invoker_failure(format!(
            "{TIMEOUT_PREFIX} Process killed after {}",
            format_timeout(after)
        ))
    }

    pub fn not_found(program: &str) -> Self {
        Self::invoker_failure(format!("{ERROR_PREFIX} '{program}' {NOT_FOUND_SUFFIX}"))
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.exit_code == INVOKER_FAILURE_CODE && self.stderr.starts_with(TIMEOUT_PREFIX)
    }

    #[must_use]
    pub fn not_found_error(&self) -> bool {
        self.exit_code == INVOKER_FAILURE_CODE && self.stderr.ends_with(NOT_FOUND_SUFFIX)
    }

    /// stdout followed by stderr, the way a terminal would show them.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// How a supervised child came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own within the timeout (or never started).
    Exited,
    /// Exited after SIGTERM, within the grace period.
    Graceful,
    /// Needed SIGKILL.
    Forced,
}

/// Output plus lifecycle details, for callers that need to inspect them.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub output: ProcessOutput,
    pub pid: Option<u32>,
    pub termination: Termination,
}

impl ProcessReport {
    fn not_started(output: ProcessOutput) -> Self {
        Self {
            output,
            pid: None,
            termination: Termination::Exited,
        }
    }
}

/// One program invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Written to stdin, which is then closed. `None` connects stdin to null.
    pub input: Option<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            input: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Runs child processes with a timeout and a terminate-then-kill escalation.
#[derive(Debug, Clone, Copy)]
pub struct ProcessSupervisor {
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_SECS))
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run to completion or timeout.
    pub async fn run(&self, spec: &ProcessSpec, timeout: Duration) -> ProcessOutput {
        self.run_with_report(spec, timeout).await.output
    }

    /// Run to completion or timeout, reporting how the child ended.
    pub async fn run_with_report(&self, spec: &ProcessSpec, timeout: Duration) -> ProcessReport {
        if !spec.working_dir.is_dir() {
            return ProcessReport::not_started(ProcessOutput::invoker_failure(format!(
                "{ERROR_PREFIX} Working directory does not exist: {}",
                spec.working_dir.display()
            )));
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(if spec.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(program = %spec.program, "Program not found");
                return ProcessReport::not_started(ProcessOutput::not_found(&spec.program));
            }
            Err(e) => {
                return ProcessReport::not_started(ProcessOutput::invoker_failure(format!(
                    "{ERROR_PREFIX} Failed to start '{}': {e}",
                    spec.program
                )));
            }
        };

        let pid = child.id();
        debug!(program = %spec.program, pid = ?pid, timeout_secs = timeout.as_secs(), "Spawned process");

        let stdout_pipe = child.stdout.take().map(PipeReader::spawn);
        let stderr_pipe = child.stderr.take().map(PipeReader::spawn);
        let stdin = child.stdin.take();
        let input = spec.input.as_deref();

        let child_ref = &mut child;
        let run = async move {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // The child may exit without reading everything.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Failed to write process input");
                }
                drop(stdin);
            }
            child_ref.wait().await
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(status)) => {
                if signal_group(pid, GroupSignal::Kill) {
                    debug!(pid = ?pid, "Killed processes left behind in the group");
                }
                let stdout = drain(stdout_pipe).await;
                let stderr = drain(stderr_pipe).await;
                let exit_code = exit_code_of(status);
                debug!(pid = ?pid, exit_code, "Process exited");
                ProcessReport {
                    output: ProcessOutput::new(stdout, stderr, exit_code),
                    pid,
                    termination: Termination::Exited,
                }
            }
            Ok(Err(e)) => {
                let termination = self.terminate(&mut child, pid).await;
                abort(stdout_pipe);
                abort(stderr_pipe);
                ProcessReport {
                    output: ProcessOutput::invoker_failure(format!(
                        "{ERROR_PREFIX} Failed waiting for '{}': {e}",
                        spec.program
                    )),
                    pid,
                    termination,
                }
            }
            Err(_) => {
                warn!(
                    program = %spec.program,
                    pid = ?pid,
                    timeout_secs = timeout.as_secs(),
                    "Process timed out, terminating"
                );
                let termination = self.terminate(&mut child, pid).await;
                abort(stdout_pipe);
                abort(stderr_pipe);
                ProcessReport {
                    output: ProcessOutput::timeout(timeout),
                    pid,
                    termination,
                }
            }
        }
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL whatever is
    /// left of it. Always reaps.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Termination {
        let mut termination = Termination::Forced;
        if signal_group(pid, GroupSignal::Terminate) {
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(_)) => {
                    debug!(pid = ?pid, "Process exited after SIGTERM");
                    termination = Termination::Graceful;
                }
                Ok(Err(e)) => debug!(pid = ?pid, error = %e, "Wait after SIGTERM failed"),
                Err(_) => debug!(
                    pid = ?pid,
                    grace_secs = self.grace.as_secs_f64(),
                    "Process ignored SIGTERM"
                ),
            }
        }

        // A leader that exited on SIGTERM may still have descendants.
        signal_group(pid, GroupSignal::Kill);
        if termination == Termination::Forced {
            // kill() sends SIGKILL and waits for the child.
            if let Err(e) = child.kill().await {
                warn!(pid = ?pid, error = %e, "Failed to kill process");
            }
        }
        termination
    }
}

/// `300s` for whole seconds, otherwise the fraction without trailing zeros.
#[must_use]
pub fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        return format!("{}s", timeout.as_secs());
    }
    let secs = format!("{:.3}", timeout.as_secs_f64());
    let secs = secs.trim_end_matches('0').trim_end_matches('.');
    format!("{secs}s")
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Signal the process group led by `pid`. False when nothing was signalled.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: GroupSignal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) => true,
        // The group is already empty.
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!(pgid = raw, signal = ?signal, error = %e, "Group signal failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: GroupSignal) -> bool {
    false
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(INVOKER_FAILURE_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(INVOKER_FAILURE_CODE)
}

/// Background reader for one child pipe.
///
/// Bytes land in a shared buffer as they arrive, so whatever was read stays
/// available even when the reader task has to be abandoned.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Pipe read failed");
                        break;
                    }
                }
            }
        });
        Self { buf, task }
    }

    /// Wait up to `limit` for end of stream, then return what was read.
    async fn collect(mut self, limit: Duration) -> String {
        if tokio::time::timeout(limit, &mut self.task).await.is_err() {
            self.task.abort();
            debug!(
                limit_secs = limit.as_secs_f64(),
                "Pipe still open, keeping partial output"
            );
        }
        let bytes = self
            .buf
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

async fn drain(pipe: Option<PipeReader>) -> String {
    match pipe {
        Some(pipe) => pipe.collect(PIPE_DRAIN_TIMEOUT).await,
        None => String::new(),
    }
}

fn abort(pipe: Option<PipeReader>) {
    if let Some(pipe) = pipe {
        pipe.task.abort();
    }
}

/// The external coding agent, run once per prompt.
#[derive(Debug, Clone)]
pub struct AgentProcess {
    program: String,
    args: Vec<String>,
    delivery: PromptDelivery,
    supervisor: ProcessSupervisor,
}

impl AgentProcess {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            delivery: PromptDelivery::default(),
            supervisor: ProcessSupervisor::default(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone())
            .with_args(config.args.clone())
            .with_delivery(config.prompt_via)
            .with_grace(Duration::from_secs(config.grace_secs))
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: PromptDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.supervisor = ProcessSupervisor::new(grace);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn spec(&self, prompt: &str, working_dir: &Path) -> ProcessSpec {
        let spec = ProcessSpec::new(self.program.clone(), working_dir).with_args(self.args.clone());
        match self.delivery {
            PromptDelivery::Stdin => spec.with_input(prompt),
            PromptDelivery::Argument => spec.with_args([prompt]),
        }
    }
}

#[async_trait]
impl AgentInvoker for AgentProcess {
    async fn invoke(&self, prompt: &str, timeout: Duration, working_dir: &Path) -> ProcessOutput {
        debug!(
            program = %self.program,
            prompt_chars = prompt.len(),
            "Invoking agent"
        );
        self.supervisor
            .run(&self.spec(prompt, working_dir), timeout)
            .await
    }
}
