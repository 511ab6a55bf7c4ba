//! Argument vectors for the enforcer.
//!
//! Nothing here goes through a shell: the confined command is carried as a
//! list of words and every enforcer option is its own argument.

use std::ffi::OsString;

use crate::config::RunPolicy;
use crate::error::{Error, Result};
use crate::pool::BoxId;

use super::layout::{BoxLayout, STDERR_FILE, STDOUT_FILE};

/// The program and arguments to run inside a box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Starts a command line with `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds a command from an already-split argument vector, program first.
    pub fn from_argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(Error::InvalidCommand("command line is empty".to_string()));
        }
        Ok(Self { argv })
    }

    /// Splits a command string into words using POSIX shell quoting rules.
    ///
    /// No expansion of any kind is performed.
    pub fn parse(line: &str) -> Result<Self> {
        let argv = shlex::split(line).ok_or_else(|| {
            Error::InvalidCommand(format!(
                "unbalanced quoting or trailing backslash in '{}'",
                line
            ))
        })?;
        Self::from_argv(argv)
    }

    /// The words of the command, program first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The program to run.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

// isolate rejects a box whose init, run and cleanup disagree on `--cg`.
fn box_flags(id: BoxId, policy: &RunPolicy) -> Vec<OsString> {
    let mut flags = Vec::with_capacity(2);
    if policy.cgroup_mode() {
        flags.push("--cg".into());
    }
    flags.push(format!("--box-id={}", id).into());
    flags
}

/// `[--cg] --box-id=<id> --cleanup`
pub fn cleanup_args(id: BoxId, policy: &RunPolicy) -> Vec<OsString> {
    let mut args = box_flags(id, policy);
    args.push("--cleanup".into());
    args
}

/// `[--cg] --box-id=<id> --init`
pub fn init_args(id: BoxId, policy: &RunPolicy) -> Vec<OsString> {
    let mut args = box_flags(id, policy);
    args.push("--init".into());
    args
}

/// Arguments for one confined run of `command` in box `id`.
pub fn run_args(
    id: BoxId,
    layout: &BoxLayout,
    policy: &RunPolicy,
    command: &CommandLine,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    for dir in &policy.bind_dirs {
        let mut flag = OsString::from("--dir=");
        flag.push(dir);
        args.push(flag);
    }
    if policy.share_net {
        args.push("--share-net".into());
    }
    if policy.full_env {
        args.push("--full-env".into());
    }
    args.extend(box_flags(id, policy));

    if policy.limit_processes {
        match policy.max_processes {
            Some(max) => args.push(format!("--processes={}", max).into()),
            None => args.push("--processes".into()),
        }
    }
    args.push(format!("--wall-time={}", policy.wall_time_secs).into());
    if let Some(cpu) = policy.cpu_time_secs {
        args.push(format!("--time={}", cpu).into());
    }
    if let Some(mem) = policy.memory_kib {
        args.push(format!("--mem={}", mem).into());
    }
    if let Some(cg_mem) = policy.cgroup_memory_kib {
        args.push(format!("--cg-mem={}", cg_mem).into());
    }

    let mut meta = OsString::from("--meta=");
    meta.push(layout.report());
    args.push(meta);
    args.push(format!("--stdout={}", STDOUT_FILE).into());
    args.push(format!("--stderr={}", STDERR_FILE).into());

    args.push("--run".into());
    args.push("--".into());
    args.extend(command.argv().iter().map(OsString::from));
    args
}
