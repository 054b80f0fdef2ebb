//! The single primitive for running external executables.
//!
//! Runners never fail: a process that cannot be spawned is reported as exit
//! status 127 with the OS error on stderr. All interpretation of the result
//! (not found, rate limited, validation) happens in the calling service.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Exit status reported when the executable could not be launched.
pub const SPAWN_FAILURE: i32 = 127;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_trimmed(&self) -> Option<String> {
        let trimmed = self.stderr.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Human-readable command line for error messages and logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> CommandOutput;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> CommandOutput {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdin(Stdio::null());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        // Keep git from opening pagers or prompting for credentials.
        cmd.env("GIT_PAGER", "cat").env("GIT_TERMINAL_PROMPT", "0").env("GH_PROMPT_DISABLED", "1");

        let output = match cmd.output() {
            Ok(o) => o,
            Err(e) => {
                debug!(program = invocation.program.as_str(), error = %e, "Spawn failed");
                return CommandOutput {
                    status: SPAWN_FAILURE,
                    stdout: Vec::new(),
                    stderr: format!("{}: {e}", invocation.program),
                };
            }
        };
        // Killed by a signal: no exit code.
        let status = output.status.code().unwrap_or(-1);
        debug!(
            command = invocation.display().as_str(),
            status,
            stdout_bytes = output.stdout.len(),
            "Command finished"
        );
        CommandOutput {
            status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}
