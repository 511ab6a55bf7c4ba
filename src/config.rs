//! Configuration for the pool, the enforcer and the run policy.
//!
//! Everything has a default matching the stock isolate deployment, so an
//! empty TOML document is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pool::DEFAULT_CAPACITY;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Number of boxes in the pool.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How to launch the enforcer.
    #[serde(default)]
    pub enforcer: EnforcerConfig,

    /// Limits and exposure applied to every run.
    #[serde(default)]
    pub policy: RunPolicy,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            enforcer: EnforcerConfig::default(),
            policy: RunPolicy::default(),
        }
    }
}

impl SandboxConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// How the enforcer binary is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcerConfig {
    /// Path to the enforcer binary.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Command the enforcer is run through, e.g. `["sudo"]`. Empty runs it directly.
    #[serde(default = "default_privilege_prefix")]
    pub privilege_prefix: Vec<String>,
}

fn default_program() -> PathBuf {
    PathBuf::from("./resources/isolate")
}

fn default_privilege_prefix() -> Vec<String> {
    vec!["sudo".to_string()]
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            privilege_prefix: default_privilege_prefix(),
        }
    }
}

/// Limits and exposure applied to each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Directory under which the enforcer keeps one `<id>/box` per box.
    #[serde(default = "default_isolation_root")]
    pub isolation_root: PathBuf,

    /// Host directories exposed read-only inside the box.
    #[serde(default = "default_bind_dirs")]
    pub bind_dirs: Vec<PathBuf>,

    /// Keep the host network visible inside the box.
    #[serde(default = "default_true")]
    pub share_net: bool,

    /// Pass the full environment through to the confined program.
    #[serde(default = "default_true")]
    pub full_env: bool,

    /// Wall-clock limit in seconds.
    #[serde(default = "default_wall_time_secs")]
    pub wall_time_secs: u64,

    /// Enable the enforcer's process limiting.
    #[serde(default = "default_true")]
    pub limit_processes: bool,

    /// Maximum number of processes; the enforcer's own default when unset.
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// CPU-time limit in seconds.
    #[serde(default)]
    pub cpu_time_secs: Option<f64>,

    /// Address-space limit in KiB.
    #[serde(default)]
    pub memory_kib: Option<u64>,

    /// Control-group memory limit in KiB; enables cgroup mode.
    #[serde(default)]
    pub cgroup_memory_kib: Option<u64>,
}

fn default_isolation_root() -> PathBuf {
    PathBuf::from("/var/local/lib/isolate")
}

fn default_bind_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/usr/bin/"), PathBuf::from("/etc/")]
}

fn default_true() -> bool {
    true
}

fn default_wall_time_secs() -> u64 {
    600
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            isolation_root: default_isolation_root(),
            bind_dirs: default_bind_dirs(),
            share_net: true,
            full_env: true,
            wall_time_secs: default_wall_time_secs(),
            limit_processes: true,
            max_processes: None,
            cpu_time_secs: None,
            memory_kib: None,
            cgroup_memory_kib: None,
        }
    }
}

impl RunPolicy {
    /// Wall-clock limit as a duration.
    pub fn wall_time(&self) -> Duration {
        Duration::from_secs(self.wall_time_secs)
    }

    /// Whether boxes are run under control groups.
    pub fn cgroup_mode(&self) -> bool {
        self.cgroup_memory_kib.is_some()
    }

    /// Sets the isolation root.
    pub fn with_isolation_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.isolation_root = root.into();
        self
    }

    /// Sets the wall-clock limit.
    pub fn with_wall_time(mut self, limit: Duration) -> Self {
        self.wall_time_secs = limit.as_secs();
        self
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.capacity == 0 {
            result.add_error("capacity must be at least 1");
        }
        if self.capacity > u32::MAX as usize {
            result.add_error("capacity does not fit a box id");
        }
        if self.capacity > 1000 {
            result.add_warning("capacity over 1000 boxes may exhaust host uids");
        }

        result.merge(self.enforcer.validate());
        result.merge(self.policy.validate());
        result
    }
}

impl Validate for EnforcerConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.program.as_os_str().is_empty() {
            result.add_error("enforcer program cannot be empty");
        }
        if self.privilege_prefix.iter().any(|part| part.trim().is_empty()) {
            result.add_error("privilege_prefix entries cannot be blank");
        }

        result
    }
}

impl Validate for RunPolicy {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.wall_time_secs == 0 {
            result.add_error("wall_time_secs must be at least 1");
        }
        if self.wall_time_secs > 3600 {
            result.add_warning("wall_time_secs over 1 hour may indicate a misconfiguration");
        }

        if !self.isolation_root.is_absolute() {
            result.add_error(format!(
                "isolation_root '{}' must be absolute",
                self.isolation_root.display()
            ));
        }

        for dir in &self.bind_dirs {
            if !dir.is_absolute() {
                result.add_error(format!("bind dir '{}' must be absolute", dir.display()));
            }
        }

        if self.max_processes == Some(0) {
            result.add_error("max_processes must be at least 1");
        }
        if self.max_processes.is_some() && !self.limit_processes {
            result.add_warning("max_processes is ignored while limit_processes is false");
        }

        if let Some(cpu) = self.cpu_time_secs {
            if cpu.is_nan() || cpu <= 0.0 {
                result.add_error("cpu_time_secs must be positive");
            } else if cpu > self.wall_time_secs as f64 {
                result.add_warning("cpu_time_secs exceeds wall_time_secs and will never trigger");
            }
        }

        if self.memory_kib == Some(0) || self.cgroup_memory_kib == Some(0) {
            result.add_error("memory limits must be at least 1 KiB");
        }

        result
    }
}
