//! `su`-backed privileged executor
//!
//! Each call spawns a fresh elevated shell, feeds it the command followed by
//! `exit`, and waits for the shell to terminate.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, error};

use super::PrivilegedExecutor;

/// Failures while running a privileged command
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn privileged shell {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("privileged shell has no stdin")]
    NoStdin,

    #[error("failed to write command to privileged shell: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to wait for privileged shell: {0}")]
    Wait(#[source] std::io::Error),

    #[error("privileged shell exited with {code:?}: {stderr}")]
    Status { code: Option<i32>, stderr: String },
}

/// Executes commands through an elevated shell such as `su`
#[derive(Debug, Clone)]
pub struct SuExecutor {
    program: PathBuf,
}

impl SuExecutor {
    /// Create an executor that spawns `program` for every command
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `command` and surface the failure reason
    pub fn run(&self, command: &str) -> Result<(), ExecError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        {
            // Dropping stdin at the end of this block closes the pipe.
            let mut stdin = child.stdin.take().ok_or(ExecError::NoStdin)?;
            stdin
                .write_all(format!("{command}\n").as_bytes())
                .and_then(|_| stdin.write_all(b"exit\n"))
                .and_then(|_| stdin.flush())
                .map_err(ExecError::Write)?;
        }

        let output = child.wait_with_output().map_err(ExecError::Wait)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ExecError::Status {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl PrivilegedExecutor for SuExecutor {
    fn execute(&self, command: &str) -> bool {
        match self.run(command) {
            Ok(()) => {
                debug!(command, "privileged command succeeded");
                true
            }
            Err(e) => {
                error!(command, error = %e, "privileged exec failed");
                false
            }
        }
    }
}
