//! Running confirmed commands through the system shell.
//!
//! The executor only accepts [`ApprovedCommand`] values, which can only be
//! produced by [`crate::decision::CommandDecision::approve`].

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::decision::ApprovedCommand;

/// Result of executing an approved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of process output, newline included when the process wrote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Trait for running shell command lines.
///
/// This abstraction enables testing without spawning real processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `command_line` with piped output, sending every line to `lines`
    /// as soon as it is read. The process is killed after `timeout`.
    async fn capture(
        &self,
        command_line: &str,
        timeout: Duration,
        lines: UnboundedSender<OutputLine>,
    ) -> Result<ExitStatus>;

    /// Runs `command_line` attached to the terminal and returns its exit code.
    async fn interactive(&self, command_line: &str, timeout: Duration) -> Result<Option<i32>>;
}

// =============================================================================
// Default Implementations
// =============================================================================

/// Process runner using `sh -c`, or `cmd /C` on Windows.
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    fn shell(command_line: &str) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        cmd.arg(command_line).kill_on_drop(true);
        cmd
    }

    async fn forward<R: AsyncRead + Unpin>(
        reader: R,
        stream: OutputStream,
        lines: UnboundedSender<OutputLine>,
    ) -> std::io::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf).into_owned();
            // Keep draining after the receiver is gone so the child never blocks on a full pipe.
            let _ = lines.send(OutputLine { stream, text });
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn capture(
        &self,
        command_line: &str,
        timeout: Duration,
        lines: UnboundedSender<OutputLine>,
    ) -> Result<ExitStatus> {
        let mut cmd = Self::shell(command_line);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| anyhow!("Failed to start shell: {}", e))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("stderr was not piped"))?;

        let run = async {
            let (out, err, status) = tokio::join!(
                Self::forward(stdout, OutputStream::Stdout, lines.clone()),
                Self::forward(stderr, OutputStream::Stderr, lines),
                child.wait()
            );
            out?;
            err?;
            Ok::<_, std::io::Error>(status?)
        };

        tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| anyhow!("Command timed out after {}s", timeout.as_secs()))?
            .map_err(|e| anyhow!("Failed to read command output: {}", e))
    }

    async fn interactive(&self, command_line: &str, timeout: Duration) -> Result<Option<i32>> {
        let mut cmd = Self::shell(command_line);
        cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
        let status = tokio::time::timeout(timeout, cmd.status())
            .await
            .map_err(|_| anyhow!("Command timed out after {}s", timeout.as_secs()))?
            .map_err(|e| anyhow!("Failed to start shell: {}", e))?;
        Ok(status.code())
    }
}

// =============================================================================
// Execution log
// =============================================================================

/// Appends every executed command and its output to one file per day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLog {
    dir: PathBuf,
}

impl ExecutionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `logs/` under the configuration directory.
    pub fn default_location() -> Option<Self> {
        Config::get_config_dir().ok().map(|dir| Self::new(dir.join("logs")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("shell_log_{}.log", date.format("%Y-%m-%d")))
    }

    /// Appends one entry stamped with the local time and returns the file written.
    pub fn append(&self, command: &str, outcome: &ExecutionOutcome) -> Result<PathBuf> {
        self.append_at(Local::now().naive_local(), command, outcome)
    }

    fn append_at(&self, at: NaiveDateTime, command: &str, outcome: &ExecutionOutcome) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(at.date());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let rule = "=".repeat(80);
        writeln!(file, "\n{}", rule)?;
        writeln!(file, "[{}] Command: {}", at.format("%Y-%m-%d %H:%M:%S"), command)?;
        match outcome.exit_code {
            Some(code) => writeln!(file, "Exit code: {}", code)?,
            None => writeln!(file, "Exit code: none (terminated by signal)")?,
        }
        if !outcome.stdout.is_empty() {
            writeln!(file, "\nStdout:")?;
            write!(file, "{}", outcome.stdout)?;
        }
        if !outcome.stderr.is_empty() {
            writeln!(file, "\nStderr:")?;
            write!(file, "{}", outcome.stderr)?;
        }
        writeln!(file, "{}", rule)?;
        Ok(path)
    }
}

// =============================================================================
// Executor Implementation
// =============================================================================

/// Executes approved commands.
///
/// Output lines are echoed to the caller's streams as they arrive and are
/// also kept so a failure can be sent for diagnosis. Commands starting with
/// `sudo` run attached to the terminal instead, so a password prompt works;
/// their output is not captured.
///
/// # Example
///
/// ```ignore
/// let executor = Executor::new(Duration::from_secs(60), false);
/// let outcome = executor.execute(&approved).await?;
/// ```
pub struct Executor {
    timeout: Duration,
    verbose: bool,
    log: Option<ExecutionLog>,
}

impl Executor {
    /// Creates a new executor.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Longest time a command may run before it is killed
    /// * `verbose` - If true, prints the command line before running it
    pub fn new(timeout: Duration, verbose: bool) -> Self {
        Self {
            timeout,
            verbose,
            log: None,
        }
    }

    /// Records every execution in `log`.
    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Executes an approved command, echoing its output to stdout/stderr.
    pub async fn execute(&self, approved: &ApprovedCommand) -> Result<ExecutionOutcome> {
        self.execute_with_runner(approved, &SystemProcessRunner, &mut std::io::stdout(), &mut std::io::stderr())
            .await
    }

    /// Executes an approved command with injected dependencies (for testing).
    pub async fn execute_with_runner<W1: Write, W2: Write>(
        &self,
        approved: &ApprovedCommand,
        runner: &impl ProcessRunner,
        stdout: &mut W1,
        stderr: &mut W2,
    ) -> Result<ExecutionOutcome> {
        let command_line = approved.command().trim();
        if command_line.is_empty() {
            return Err(anyhow!("No command provided"));
        }

        info!("Executing approved command (level {})", approved.level());
        if self.verbose {
            writeln!(stdout, "▶️  {}", command_line)?;
        }

        let outcome = if Self::needs_terminal(command_line) {
            let exit_code = runner.interactive(command_line, self.timeout).await?;
            ExecutionOutcome {
                success: exit_code == Some(0),
                exit_code,
                stdout: String::new(),
                stderr: String::new(),
            }
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            let (status, echoed) = tokio::join!(
                runner.capture(command_line, self.timeout, tx),
                Self::echo_lines(rx, stdout, stderr)
            );
            let (out, err) = echoed?;
            let status = status?;
            if !status.success() {
                error!("Command failed with status: {}", status);
            }
            ExecutionOutcome {
                success: status.success(),
                exit_code: status.code(),
                stdout: out,
                stderr: err,
            }
        };

        self.record(command_line, &outcome);
        Ok(outcome)
    }

    fn needs_terminal(command_line: &str) -> bool {
        command_line.split_whitespace().next() == Some("sudo")
    }

    /// Writes lines to the matching stream until the runner hangs up, and
    /// returns everything that was written.
    async fn echo_lines<W1: Write, W2: Write>(
        mut rx: mpsc::UnboundedReceiver<OutputLine>,
        stdout: &mut W1,
        stderr: &mut W2,
    ) -> Result<(String, String)> {
        let mut out = String::new();
        let mut err = String::new();

        while let Some(line) = rx.recv().await {
            match line.stream {
                OutputStream::Stdout => {
                    stdout.write_all(line.text.as_bytes())?;
                    stdout.flush()?;
                    out.push_str(&line.text);
                }
                OutputStream::Stderr => {
                    stderr.write_all(line.text.as_bytes())?;
                    stderr.flush()?;
                    err.push_str(&line.text);
                }
            }
        }
        Ok((out, err))
    }

    fn record(&self, command_line: &str, outcome: &ExecutionOutcome) {
        let Some(log) = &self.log else {
            return;
        };
        match log.append(command_line, outcome) {
            Ok(path) => debug!("Logged execution to {}", path.display()),
            Err(e) => warn!("Could not write execution log in {}: {}", log.dir().display(), e),
        }
    }
}
