//! Child-process execution with merged output capture.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::debug::debug_command;

/// Exit code reported when the runner itself fails (spawn error, missing
/// executable, timeout), as opposed to the child exiting nonzero.
pub const EXECUTION_FAILURE: i32 = -1;

/// A line of output from a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Standard output line.
    Stdout(String),
    /// Standard error line.
    Stderr(String),
}

impl OutputLine {
    /// Returns the line text without its stream tag.
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(line) | OutputLine::Stderr(line) => line,
        }
    }
}

/// Receives output lines as they are produced.
pub type OutputSink = mpsc::UnboundedSender<OutputLine>;

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; 0 is success, [`EXECUTION_FAILURE`] is a runner failure.
    pub exit_code: i32,
    /// Merged stdout and stderr, in arrival order.
    pub output: String,
}

impl CommandResult {
    /// Creates a result from an exit code and output.
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// Creates a runner-failure result carrying a diagnostic message.
    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self::new(EXECUTION_FAILURE, message)
    }

    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `argv` in `working_dir`, streaming output to `sink` and buffering it.
///
/// Never fails: spawn errors, a missing executable and timeouts are all
/// reported as [`EXECUTION_FAILURE`] with a descriptive message.
pub async fn execute(
    argv: &[String],
    working_dir: &Path,
    timeout: Duration,
    sink: Option<&OutputSink>,
) -> CommandResult {
    let Some((program, args)) = argv.split_first() else {
        return CommandResult::execution_failure("Failed to execute command '': empty command");
    };
    let command_line = argv.join(" ");

    debug_command(argv, working_dir);
    tracing::debug!(command = %command_line, cwd = ?working_dir, "executing command");

    let spawned = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(program = %program, "command not found");
            return CommandResult::execution_failure(format!("Command not found: {}", program));
        }
        Err(e) => {
            tracing::warn!(error = %e, command = %command_line, "failed to spawn command");
            return CommandResult::execution_failure(format!(
                "Failed to execute command '{}': {}",
                command_line, e
            ));
        }
    };

    let mut buffer = String::new();
    let waited = tokio::time::timeout(timeout, capture(&mut child, sink, &mut buffer)).await;

    match waited {
        Ok(Ok(status)) => {
            let exit_code = status.code().unwrap_or(EXECUTION_FAILURE);
            tracing::debug!(command = %command_line, exit_code, "command finished");
            CommandResult::new(exit_code, buffer)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, command = %command_line, "failed waiting for command");
            CommandResult::execution_failure(format!(
                "Failed to execute command '{}': {}\n{}",
                command_line, e, buffer
            ))
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, command = %command_line, "failed to kill timed out command");
            }
            tracing::warn!(command = %command_line, timeout_secs = timeout.as_secs_f64(), "command timed out");
            CommandResult::execution_failure(format!(
                "Command timed out after {} seconds: {}\n{}",
                timeout.as_secs_f64(),
                command_line,
                buffer
            ))
        }
    }
}

/// Reads both pipes to completion, then waits for the child.
///
/// Lines are split on `\n` and decoded lossily, so bytes that are not valid
/// UTF-8 never stop a pipe from being drained.
async fn capture(
    child: &mut Child,
    sink: Option<&OutputSink>,
    buffer: &mut String,
) -> std::io::Result<ExitStatus> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(std::io::Error::other("child output was not piped"));
    };

    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);
    // Partial reads from a cancelled branch stay in these until the line ends.
    let mut stdout_line = Vec::new();
    let mut stderr_line = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout_reader.read_until(b'\n', &mut stdout_line), if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "error reading stdout");
                        stdout_open = false;
                    }
                }
                if !stdout_line.is_empty() && (!stdout_open || stdout_line.ends_with(b"\n")) {
                    record(OutputLine::Stdout(decode_line(&stdout_line)), sink, buffer);
                    stdout_line.clear();
                }
            }
            read = stderr_reader.read_until(b'\n', &mut stderr_line), if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "error reading stderr");
                        stderr_open = false;
                    }
                }
                if !stderr_line.is_empty() && (!stderr_open || stderr_line.ends_with(b"\n")) {
                    record(OutputLine::Stderr(decode_line(&stderr_line)), sink, buffer);
                    stderr_line.clear();
                }
            }
        }
    }

    child.wait().await
}

/// Strips the line ending and replaces invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}

fn record(line: OutputLine, sink: Option<&OutputSink>, buffer: &mut String) {
    buffer.push_str(line.text());
    buffer.push('\n');
    if let Some(sink) = sink {
        // A dropped receiver only loses the live view; the buffer stays complete.
        let _ = sink.send(line);
    }
}
