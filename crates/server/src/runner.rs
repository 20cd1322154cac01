//! External tool invocation.
//!
//! Tools are always started with a discrete argument vector. Nothing here
//! goes through a shell, so file names can never be interpreted as shell syntax.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// One subprocess call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Deadline for the call. `None` waits for the process however long it runs.
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name for logs and error messages.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The binary is missing or could not be started.
    #[error("{program} is unavailable: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {exit_code:?}: {stderr}")]
    ExecutionFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not finish within {}s", timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },
}

/// Runs external tools.
#[async_trait]
pub trait ToolRunner: Send + Sync + 'static {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, RunError>;
}

/// Runs tools as child processes of the service.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

#[async_trait]
impl ToolRunner for SubprocessRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, RunError> {
        let program = invocation.display_name();

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the process with it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Unavailable {
                program: program.clone(),
                source,
            })?;

        tracing::debug!(program = %program, pid = child.id(), "Spawned tool");

        let output = match invocation.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Tool timed out, killed");
                    return Err(RunError::Timeout { program, timeout });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| RunError::Unavailable {
            program: program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RunError::ExecutionFailed {
                program,
                exit_code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(0),
            stdout,
            stderr,
        })
    }
}
