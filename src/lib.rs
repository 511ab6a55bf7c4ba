//! Boxpool - a bounded pool of isolate sandboxes for running untrusted code
//!
//! This library multiplexes a fixed set of isolation boxes across concurrent
//! callers and drives each run through reset, confined execution and result
//! collection, parsing the enforcer's report into a typed outcome.

pub mod backoff;
pub mod config;
pub mod error;
pub mod pool;
pub mod sandbox;
pub mod service;

pub use backoff::{ExponentialBackoff, WaitPolicy};
pub use config::{EnforcerConfig, RunPolicy, SandboxConfig, Validate, ValidationResult};
pub use error::{Error, Result};
pub use pool::{BoxId, Lease, SandboxPool, DEFAULT_CAPACITY};
pub use sandbox::{
    BoxLayout, CapturedOutputs, CommandLine, Enforcer, EnforcerOutput, ExecutionOutcome,
    ExecutionReport, IsolateEnforcer, RunStatus, Sandbox, SandboxState, Termination,
};
pub use service::{run_in, SandboxService};
