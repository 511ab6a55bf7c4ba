//! One-call execution on top of the pool.
//!
//! [`SandboxService`] is the composition root: it owns a pool, an enforcer
//! and a run policy, and drives acquire → reset → execute → collect →
//! release. The box is released on every exit path.

use std::sync::Arc;
use std::time::Instant;

use crate::backoff::WaitPolicy;
use crate::config::{RunPolicy, SandboxConfig, Validate};
use crate::error::{Error, Result};
use crate::pool::SandboxPool;
use crate::sandbox::{CommandLine, Enforcer, ExecutionOutcome, IsolateEnforcer, Sandbox};

/// Runs commands in boxes leased from one pool.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone)]
pub struct SandboxService {
    pool: SandboxPool,
    enforcer: Arc<dyn Enforcer>,
    policy: Arc<RunPolicy>,
}

impl SandboxService {
    /// Assembles a service from its parts.
    pub fn new(pool: SandboxPool, enforcer: Arc<dyn Enforcer>, policy: RunPolicy) -> Self {
        Self {
            pool,
            enforcer,
            policy: Arc::new(policy),
        }
    }

    /// Validates `config` and builds a service around the isolate binary.
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let warnings = config.validate().into_result()?;
        for warning in warnings {
            tracing::warn!(%warning, "configuration warning");
        }

        Ok(Self::new(
            SandboxPool::new(config.capacity),
            Arc::new(IsolateEnforcer::new(config.enforcer.clone())),
            config.policy.clone(),
        ))
    }

    pub fn pool(&self) -> &SandboxPool {
        &self.pool
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Leases a box, failing immediately if the pool is exhausted.
    pub fn sandbox(&self) -> Result<Sandbox> {
        let lease = self.pool.lease()?;
        Ok(Sandbox::new(lease, self.enforcer.clone(), self.policy.clone()))
    }

    /// Leases a box, sleeping with backoff while the pool is exhausted.
    pub fn lease_with_backoff(&self, wait: WaitPolicy) -> Result<Sandbox> {
        let start = Instant::now();
        let deadline = wait.deadline(start);
        let mut backoff = wait.backoff();

        loop {
            match self.sandbox() {
                Err(Error::PoolExhausted { .. }) => match backoff.pause_until(deadline) {
                    Some(pause) => std::thread::sleep(pause),
                    None => return Err(wait_timeout(start)),
                },
                other => return other,
            }
        }
    }

    /// Async form of [`SandboxService::lease_with_backoff`].
    pub async fn lease_with_backoff_async(&self, wait: WaitPolicy) -> Result<Sandbox> {
        let start = Instant::now();
        let deadline = wait.deadline(start);
        let mut backoff = wait.backoff();

        loop {
            match self.sandbox() {
                Err(Error::PoolExhausted { .. }) => match backoff.pause_until(deadline) {
                    Some(pause) => tokio::time::sleep(pause).await,
                    None => return Err(wait_timeout(start)),
                },
                other => return other,
            }
        }
    }

    /// Runs `command` in a fresh box and collects its outcome.
    pub fn run(&self, command: &CommandLine) -> Result<ExecutionOutcome> {
        let sandbox = self.sandbox()?;
        run_in(sandbox, command)
    }

    /// Splits `line` into words and runs it; see [`SandboxService::run`].
    pub fn run_line(&self, line: &str) -> Result<ExecutionOutcome> {
        let command = CommandLine::parse(line)?;
        self.run(&command)
    }

    /// Runs `command` on a blocking thread.
    ///
    /// With a `wait` policy the box is leased with async backoff first;
    /// without one an exhausted pool fails immediately.
    pub async fn run_async(
        &self,
        command: CommandLine,
        wait: Option<WaitPolicy>,
    ) -> Result<ExecutionOutcome> {
        let sandbox = match wait {
            Some(wait) => self.lease_with_backoff_async(wait).await?,
            None => self.sandbox()?,
        };
        tokio::task::spawn_blocking(move || run_in(sandbox, &command)).await?
    }
}

impl std::fmt::Debug for SandboxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxService")
            .field("pool", &self.pool)
            .field("enforcer", &self.enforcer.name())
            .field("policy", &self.policy)
            .finish()
    }
}

fn wait_timeout(start: Instant) -> Error {
    Error::WaitTimeout {
        waited_ms: start.elapsed().as_millis() as u64,
    }
}

/// Drives a leased sandbox through reset, one run and collection, then
/// releases it whether or not that succeeded.
pub fn run_in(mut sandbox: Sandbox, command: &CommandLine) -> Result<ExecutionOutcome> {
    let box_id = sandbox.id();
    let result = drive(&mut sandbox, command);

    match &result {
        Ok(outcome) => tracing::info!(
            box_id = %box_id,
            run_id = %outcome.run_id,
            termination = ?outcome.termination,
            "run complete"
        ),
        Err(e) => tracing::warn!(box_id = %box_id, error = %e, "run failed"),
    }

    sandbox.release()?;
    result
}

fn drive(sandbox: &mut Sandbox, command: &CommandLine) -> Result<ExecutionOutcome> {
    sandbox.reset()?;
    sandbox.execute(command)?;
    sandbox.collect()
}
