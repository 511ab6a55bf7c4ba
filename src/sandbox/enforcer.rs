//! The external enforcer that creates, resets and runs boxes.

use std::ffi::OsString;
use std::process::Command;

use crate::config::EnforcerConfig;
use crate::error::Result;

/// What one enforcer invocation produced.
#[derive(Debug, Clone, Default)]
pub struct EnforcerOutput {
    /// Exit code, or `None` if the enforcer was killed by a signal.
    pub exit_code: Option<i32>,
    /// The enforcer's own standard output.
    pub stdout: String,
    /// The enforcer's own standard error.
    pub stderr: String,
}

impl EnforcerOutput {
    /// Returns true if the enforcer exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// A one-line description of a failed invocation.
    pub fn failure_reason(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Launches the isolation enforcer.
///
/// `invoke` returns `Err` only when the enforcer could not be launched at
/// all. A launched enforcer that exits non-zero is reported through
/// [`EnforcerOutput::exit_code`] and interpreted by the caller.
pub trait Enforcer: Send + Sync {
    /// Runs the enforcer once with `args`.
    fn invoke(&self, args: &[OsString]) -> Result<EnforcerOutput>;

    /// Returns the name of this enforcer, for logs.
    fn name(&self) -> &str;
}

/// The `isolate` binary, optionally launched through a privilege prefix.
#[derive(Debug, Clone)]
pub struct IsolateEnforcer {
    config: EnforcerConfig,
}

impl IsolateEnforcer {
    /// Creates an enforcer from its launch configuration.
    pub fn new(config: EnforcerConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        match self.config.privilege_prefix.split_first() {
            Some((runner, rest)) => {
                let mut cmd = Command::new(runner);
                cmd.args(rest).arg(&self.config.program);
                cmd
            }
            None => Command::new(&self.config.program),
        }
    }
}

impl Default for IsolateEnforcer {
    fn default() -> Self {
        Self::new(EnforcerConfig::default())
    }
}

impl Enforcer for IsolateEnforcer {
    fn invoke(&self, args: &[OsString]) -> Result<EnforcerOutput> {
        tracing::debug!(program = ?self.config.program, ?args, "invoking enforcer");

        let output = self.command().args(args).output()?;

        Ok(EnforcerOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn name(&self) -> &str {
        "isolate"
    }
}
