//! Sandbox module for running one command inside a leased box.
//!
//! A [`Sandbox`] drives the external [`Enforcer`] through reset, one run and
//! artifact collection. [`IsolateEnforcer`] is the production enforcer.

mod command;
mod enforcer;
mod instance;
mod layout;
mod outcome;
mod report;

pub use command::{cleanup_args, init_args, run_args, CommandLine};
pub use enforcer::{Enforcer, EnforcerOutput, IsolateEnforcer};
pub use instance::{Sandbox, SandboxState};
pub use layout::{BoxLayout, FUNCTION_OUTPUT_FILE, REPORT_FILE, STDERR_FILE, STDOUT_FILE};
pub use outcome::{CapturedOutputs, ExecutionOutcome};
pub use report::{ExecutionReport, RunStatus, Termination};
