//! External command execution
//!
//! Every docker, scanner and dive invocation goes through a [`CommandRunner`].
//! [`ProcessRunner`] spawns real child processes; [`RecordingRunner`] records
//! invocations and answers with programmed exit codes.

use crate::error::{BuildError, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A command line plus the environment and stdin it runs with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Written to the child's stdin, then closed; never logged
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Renders program and arguments only
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status of a finished command; `None` when killed by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion
    ///
    /// A non-zero exit is reported through the outcome, not as an error.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome>;
}

/// Spawns child processes with inherited stdout/stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        tracing::debug!("Running: {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        // dropping the future on cancellation terminates the child
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BuildError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let status = child.wait().await?;
        Ok(CommandOutcome {
            code: status.code(),
        })
    }
}

#[derive(Debug)]
struct ProgrammedExit {
    pattern: String,
    code: i32,
    remaining: Option<usize>,
}

/// Test double: records every command and answers with programmed exit codes
///
/// Commands succeed unless a programmed pattern is contained in their
/// rendered command line.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    exits: Mutex<Vec<ProgrammedExit>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command containing `pattern` exits with `code`
    pub fn exit_with(self, pattern: &str, code: i32) -> Self {
        self.program(pattern, code, None)
    }

    /// The next `times` commands containing `pattern` exit with `code`
    pub fn exit_with_times(self, pattern: &str, code: i32, times: usize) -> Self {
        self.program(pattern, code, Some(times))
    }

    fn program(self, pattern: &str, code: i32, remaining: Option<usize>) -> Self {
        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProgrammedExit {
                pattern: pattern.to_string(),
                code,
                remaining,
            });
        self
    }

    /// Recorded commands in invocation order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded command lines in invocation order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let line = command.to_string();
        let mut exits = self.exits.lock().unwrap_or_else(PoisonError::into_inner);
        let programmed = exits
            .iter_mut()
            .find(|e| e.remaining != Some(0) && line.contains(&e.pattern));

        let code = match programmed {
            Some(exit) => {
                if let Some(remaining) = exit.remaining.as_mut() {
                    *remaining -= 1;
                }
                exit.code
            }
            None => 0,
        };

        Ok(CommandOutcome { code: Some(code) })
    }
}
