//! Process execution seam
//!
//! Every OS utility the installer touches (hdiutil, ditto, spctl, PlistBuddy,
//! xcode-select, ...) goes through [`SystemCommand`], so the pipeline's control
//! flow can run against a scripted implementation in tests.

use std::fmt;

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::install::error::CommandError;

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Run with elevated privileges (through `sudo`)
    pub privileged: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            privileged: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|arg| arg.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileged {
            write!(f, "sudo ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; -1 when the process was terminated by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Trait for running external programs
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait SystemCommand: Send + Sync {
    /// Runs `command` to completion and captures its output.
    ///
    /// A non-zero exit is not an error; only failing to start the process is.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host, prefixing privileged ones with `sudo`
#[derive(Debug, Default)]
pub struct HostCommand;

#[async_trait::async_trait]
impl SystemCommand for HostCommand {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!("Running `{}`", command);

        let mut process = if command.privileged {
            let mut process = tokio::process::Command::new("sudo");
            process.arg(&command.program);
            process
        } else {
            tokio::process::Command::new(&command.program)
        };
        process.args(&command.args);
        for (key, value) in &command.env {
            process.env(key, value);
        }

        let output = process.output().await.map_err(|source| CommandError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
