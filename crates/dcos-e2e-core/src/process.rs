//! Subprocess boundary shared by the provisioner and nodes.
//!
//! Everything that leaves the process (`git`, `make`, `ssh`) goes through
//! [`CommandRunner`], so argument construction can be checked without
//! touching the host.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// A program invocation: binary, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run, looked up on `PATH`.
    pub program: String,
    /// Arguments, passed verbatim without a shell.
    pub args: Vec<String>,
    /// Working directory (inherits the caller's if `None`).
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result from command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Process exit code (-1 if the process was killed by a signal).
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an [`Invocation`] to completion and captures its output.
///
/// Implementations must not treat a non-zero exit as an error; callers
/// decide what a failing exit code means.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation and wait for it to exit.
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ExecResult>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// Children are killed if the returned future is dropped, so wrapping
/// `run` in a timeout does not leak processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ExecResult> {
        let start = std::time::Instant::now();
        tracing::debug!(command = %invocation, cwd = ?invocation.cwd, "Running command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await?;
        let result = ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            program = %invocation.program,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Command completed"
        );
        tracing::trace!(stdout = %result.stdout, stderr = %result.stderr, "Command output");
        Ok(result)
    }
}

/// Run an invocation, turning spawn failures and non-zero exits into [`ToolError`].
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> Result<ExecResult, ToolError> {
    let result = runner
        .run(invocation)
        .await
        .map_err(|source| ToolError::Spawn {
            command: invocation.to_string(),
            source,
        })?;

    if !result.success() {
        tracing::warn!(
            command = %invocation,
            exit_code = result.exit_code,
            stderr = %result.stderr.trim(),
            "Command failed"
        );
        return Err(ToolError::Exit {
            command: invocation.to_string(),
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    Ok(result)
}
