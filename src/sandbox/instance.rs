//! One leased box and its reset/run/collect lifecycle.

use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::RunPolicy;
use crate::error::{Error, Result};
use crate::pool::{BoxId, Lease};

use super::command::{cleanup_args, init_args, run_args, CommandLine};
use super::enforcer::Enforcer;
use super::layout::BoxLayout;
use super::outcome::{CapturedOutputs, ExecutionOutcome};
use super::report::ExecutionReport;

/// Where a sandbox is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Leased but not (successfully) reset.
    Leased,
    /// Reset and waiting for one run.
    Ready,
    /// A run was attempted; reset before running again.
    RunComplete,
}

impl SandboxState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Leased => "leased",
            Self::Ready => "ready",
            Self::RunComplete => "run-complete",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exclusively owned box.
///
/// The sandbox owns its [`Lease`], so the box id goes back to the pool when
/// the sandbox is released or dropped, whatever state it is in.
pub struct Sandbox {
    lease: Lease,
    layout: BoxLayout,
    enforcer: Arc<dyn Enforcer>,
    policy: Arc<RunPolicy>,
    state: SandboxState,
}

impl Sandbox {
    /// Binds a lease to the enforcer and policy it will run under.
    pub fn new(lease: Lease, enforcer: Arc<dyn Enforcer>, policy: Arc<RunPolicy>) -> Self {
        let layout = BoxLayout::new(&policy.isolation_root, lease.id());
        Self {
            lease,
            layout,
            enforcer,
            policy,
            state: SandboxState::Leased,
        }
    }

    pub fn id(&self) -> BoxId {
        self.lease.id()
    }

    pub fn layout(&self) -> &BoxLayout {
        &self.layout
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Wipes whatever a previous occupant left and initializes the box.
    ///
    /// On failure the sandbox stays unusable; release it and surface the error.
    pub fn reset(&mut self) -> Result<()> {
        self.state = SandboxState::Leased;

        self.enforce_step("cleanup", cleanup_args(self.id(), &self.policy))?;
        self.enforce_step("init", init_args(self.id(), &self.policy))?;

        self.state = SandboxState::Ready;
        tracing::info!(box_id = %self.id(), root = ?self.layout.root(), "box reset");
        Ok(())
    }

    fn enforce_step(&self, step: &'static str, args: Vec<OsString>) -> Result<()> {
        let box_id = self.id();
        let output = self
            .enforcer
            .invoke(&args)
            .map_err(|e| Error::EnforcerInit {
                box_id,
                step,
                reason: e.to_string(),
            })?;

        if !output.success() {
            tracing::warn!(
                box_id = %box_id,
                step,
                exit_code = ?output.exit_code,
                "enforcer step failed"
            );
            return Err(Error::EnforcerInit {
                box_id,
                step,
                reason: output.failure_reason(),
            });
        }
        Ok(())
    }

    /// Runs `command` once inside the box.
    ///
    /// Only a failure to launch the enforcer is an error. How the user
    /// program fared is read from the report and captures afterwards.
    pub fn execute(&mut self, command: &CommandLine) -> Result<()> {
        if self.state != SandboxState::Ready {
            return Err(Error::InvalidState {
                box_id: self.id(),
                expected: SandboxState::Ready.as_str(),
                actual: self.state.as_str(),
            });
        }
        self.state = SandboxState::RunComplete;

        let args = run_args(self.id(), &self.layout, &self.policy, command);
        tracing::info!(
            box_id = %self.id(),
            program = %command.program(),
            wall_time_secs = self.policy.wall_time_secs,
            "running command in box"
        );

        let output = self
            .enforcer
            .invoke(&args)
            .map_err(|e| Error::EnforcerInvocation(format!("{}: {}", self.enforcer.name(), e)))?;

        tracing::debug!(
            box_id = %self.id(),
            exit_code = ?output.exit_code,
            "enforcer run finished"
        );
        Ok(())
    }

    /// Splits `line` into words and runs it; see [`Sandbox::execute`].
    pub fn execute_line(&mut self, line: &str) -> Result<()> {
        let command = CommandLine::parse(line)?;
        self.execute(&command)
    }

    /// Reads and parses the run report.
    pub fn read_report(&self) -> Result<ExecutionReport> {
        let path = self.layout.report();
        match read_optional(&path)? {
            Some(bytes) => Ok(ExecutionReport::parse(&String::from_utf8_lossy(&bytes))),
            None => Err(Error::ReportUnavailable(path)),
        }
    }

    /// Reads the captured standard output.
    pub fn read_stdout(&self) -> Result<Vec<u8>> {
        read_mandatory(&self.layout.stdout())
    }

    /// Reads the captured standard error.
    pub fn read_stderr(&self) -> Result<Vec<u8>> {
        read_mandatory(&self.layout.stderr())
    }

    /// Reads the function result, `None` if the program wrote none.
    pub fn read_function_output(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.layout.function_output())
    }

    /// Reads the report and every capture into one outcome.
    pub fn collect(&self) -> Result<ExecutionOutcome> {
        let report = self.read_report()?;
        let outputs = CapturedOutputs {
            stdout: self.read_stdout()?,
            stderr: self.read_stderr()?,
            function_output: self.read_function_output()?,
        };

        Ok(ExecutionOutcome {
            run_id: Uuid::new_v4(),
            box_id: self.id(),
            termination: report.termination(),
            report,
            outputs,
        })
    }

    /// Returns the box to the pool.
    pub fn release(self) -> Result<()> {
        tracing::debug!(box_id = %self.id(), state = %self.state, "releasing box");
        self.lease.release()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id())
            .field("root", &self.layout.root())
            .field("enforcer", &self.enforcer.name())
            .field("state", &self.state)
            .finish()
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_mandatory(path: &Path) -> Result<Vec<u8>> {
    read_optional(path)?.ok_or_else(|| Error::ArtifactMissing(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use crate::pool::SandboxPool;
    use crate::sandbox::enforcer::EnforcerOutput;

    /// Records invocations and answers with a fixed exit code per step.
    struct ScriptedEnforcer {
        calls: Mutex<Vec<Vec<String>>>,
        cleanup_code: i32,
        init_code: i32,
        launch_fails: bool,
    }

    impl ScriptedEnforcer {
        fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                cleanup_code: 0,
                init_code: 0,
                launch_fails: false,
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Enforcer for ScriptedEnforcer {
        fn invoke(&self, args: &[OsString]) -> Result<EnforcerOutput> {
            let args: Vec<String> = args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.lock().unwrap().push(args.clone());

            if self.launch_fails {
                return Err(std::io::Error::new(ErrorKind::NotFound, "no such binary").into());
            }
            let code = if args.iter().any(|a| a == "--cleanup") {
                self.cleanup_code
            } else if args.iter().any(|a| a == "--init") {
                self.init_code
            } else {
                1
            };
            Ok(EnforcerOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: "scripted".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn sandbox_with(enforcer: Arc<ScriptedEnforcer>, root: &Path) -> (SandboxPool, Sandbox) {
        let pool = SandboxPool::new(1);
        let policy = Arc::new(RunPolicy::default().with_isolation_root(root));
        let sandbox = Sandbox::new(pool.lease().unwrap(), enforcer, policy);
        (pool, sandbox)
    }

    #[test]
    fn reset_runs_cleanup_then_init() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer.clone(), temp.path());

        sandbox.reset().unwrap();

        assert_eq!(sandbox.state(), SandboxState::Ready);
        assert_eq!(
            enforcer.calls(),
            vec![
                vec!["--box-id=0".to_string(), "--cleanup".to_string()],
                vec!["--box-id=0".to_string(), "--init".to_string()],
            ]
        );
    }

    #[test]
    fn cgroup_mode_reaches_every_invocation() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let pool = SandboxPool::new(1);
        let policy = Arc::new(RunPolicy {
            cgroup_memory_kib: Some(131072),
            ..RunPolicy::default().with_isolation_root(temp.path())
        });
        let mut sandbox = Sandbox::new(pool.lease().unwrap(), enforcer.clone(), policy);

        sandbox.reset().unwrap();
        sandbox.execute(&CommandLine::new("true")).unwrap();

        let calls = enforcer.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|args| args.iter().any(|a| a == "--cg")));
    }

    #[test]
    fn failed_init_leaves_box_unusable() {
        let enforcer = Arc::new(ScriptedEnforcer {
            init_code: 2,
            ..ScriptedEnforcer::ok()
        });
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer, temp.path());

        let err = sandbox.reset().unwrap_err();

        assert!(matches!(err, Error::EnforcerInit { step: "init", .. }));
        assert!(err.to_string().contains("exit code 2"));
        assert_eq!(sandbox.state(), SandboxState::Leased);
        assert!(matches!(
            sandbox.execute(&CommandLine::new("true")),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn failed_cleanup_skips_init() {
        let enforcer = Arc::new(ScriptedEnforcer {
            cleanup_code: 1,
            ..ScriptedEnforcer::ok()
        });
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer.clone(), temp.path());

        let err = sandbox.reset().unwrap_err();

        assert!(matches!(err, Error::EnforcerInit { step: "cleanup", .. }));
        assert_eq!(enforcer.calls().len(), 1);
    }

    #[test]
    fn unlaunchable_enforcer_fails_reset_and_run_distinctly() {
        let enforcer = Arc::new(ScriptedEnforcer {
            launch_fails: true,
            ..ScriptedEnforcer::ok()
        });
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer, temp.path());

        assert!(matches!(sandbox.reset(), Err(Error::EnforcerInit { .. })));

        sandbox.state = SandboxState::Ready;
        assert!(matches!(
            sandbox.execute(&CommandLine::new("true")),
            Err(Error::EnforcerInvocation(_))
        ));
    }

    #[test]
    fn non_zero_run_exit_is_not_an_error() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer, temp.path());

        sandbox.reset().unwrap();
        sandbox.execute_line("python3 -c 'raise SystemExit(1)'").unwrap();

        assert_eq!(sandbox.state(), SandboxState::RunComplete);
    }

    #[test]
    fn second_execute_requires_reset() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (_pool, mut sandbox) = sandbox_with(enforcer, temp.path());

        sandbox.reset().unwrap();
        sandbox.execute_line("true").unwrap();
        let err = sandbox.execute_line("true").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                actual: "run-complete",
                ..
            }
        ));

        sandbox.reset().unwrap();
        assert!(sandbox.execute_line("true").is_ok());
    }

    #[test]
    fn missing_artifacts_are_classified() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (_pool, sandbox) = sandbox_with(enforcer, temp.path());

        assert!(matches!(sandbox.read_report(), Err(Error::ReportUnavailable(_))));
        assert!(matches!(sandbox.read_stdout(), Err(Error::ArtifactMissing(_))));
        assert!(matches!(sandbox.read_stderr(), Err(Error::ArtifactMissing(_))));
        assert_eq!(sandbox.read_function_output().unwrap(), None);
    }

    #[test]
    fn collect_reads_every_artifact() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (_pool, sandbox) = sandbox_with(enforcer, temp.path());
        let root = sandbox.layout().root().to_path_buf();
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("meta.txt"), "status:RE\nexitcode:3\n").unwrap();
        std::fs::write(root.join("_standardOutput.txt"), "partial").unwrap();
        std::fs::write(root.join("_standardError.txt"), "").unwrap();
        std::fs::write(root.join("_functionOutput.txt"), "{\"ok\":false}").unwrap();

        let outcome = sandbox.collect().unwrap();

        assert_eq!(outcome.box_id, BoxId::new(0));
        assert_eq!(outcome.report.exit_code(), Some(3));
        assert_eq!(outcome.outputs.stdout, b"partial");
        assert!(outcome.outputs.stderr.is_empty());
        assert_eq!(
            outcome.outputs.function_output_lossy().as_deref(),
            Some("{\"ok\":false}")
        );
        assert!(!outcome.succeeded());
    }

    #[test]
    fn release_returns_box_to_pool() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (pool, sandbox) = sandbox_with(enforcer, temp.path());
        assert_eq!(pool.available(), 0);

        sandbox.release().unwrap();

        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn dropping_sandbox_returns_box_to_pool() {
        let enforcer = Arc::new(ScriptedEnforcer::ok());
        let temp = TempDir::new().unwrap();
        let (pool, sandbox) = sandbox_with(enforcer, temp.path());

        drop(sandbox);

        assert_eq!(pool.available(), 1);
    }
}
