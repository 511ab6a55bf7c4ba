//! Error types for the sandbox pool and execution lifecycle.

use std::path::PathBuf;
use thiserror::Error;

use crate::pool::BoxId;

/// Top-level error type for pool and sandbox operations.
///
/// Every variant describes a failure of the core itself. A user program that
/// ran and failed is never an `Error`; that is conveyed through the report
/// and captured outputs.
#[derive(Error, Debug)]
pub enum Error {
    /// Every box in the pool is currently leased.
    #[error("sandbox pool exhausted: all {capacity} boxes are leased")]
    PoolExhausted { capacity: usize },

    /// A box was released that is not currently leased.
    #[error("box {0} is not leased (double release?)")]
    NotLeased(BoxId),

    /// A box id outside the pool's range was released.
    #[error("box {id} is outside the pool range [0, {capacity})")]
    UnknownBox { id: BoxId, capacity: usize },

    /// The enforcer's cleanup or init step failed.
    #[error("failed to {step} box {box_id}: {reason}")]
    EnforcerInit {
        box_id: BoxId,
        step: &'static str,
        reason: String,
    },

    /// The enforcer could not be launched for a run.
    #[error("failed to invoke enforcer: {0}")]
    EnforcerInvocation(String),

    /// The run report does not exist; the result is unknown.
    #[error("run report unavailable at {0}")]
    ReportUnavailable(PathBuf),

    /// A mandatory capture file does not exist.
    #[error("mandatory artifact missing at {0}")]
    ArtifactMissing(PathBuf),

    /// A lifecycle operation was called out of order.
    #[error("box {box_id} is {actual}, expected {expected}")]
    InvalidState {
        box_id: BoxId,
        expected: &'static str,
        actual: &'static str,
    },

    /// The command line to run could not be turned into an argument vector.
    #[error("invalid command line: {0}")]
    InvalidCommand(String),

    /// No box freed up before the caller's wait deadline.
    #[error("no box became free within {waited_ms} ms")]
    WaitTimeout { waited_ms: u64 },

    /// The blocking task driving a run panicked or was cancelled.
    #[error("run task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error while reading artifacts or configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for pool and sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;
