//! The enforcer's run report.
//!
//! The report is newline-delimited `key:value` text. Keys and their presence
//! are decided by the enforcer; a killed program can leave a partial report,
//! so parsing never fails as a whole.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome class written under the `status` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The program exited normally with status 0.
    Ok,
    /// The program exited with a non-zero status.
    RuntimeError,
    /// The program was killed by a signal.
    Signaled,
    /// The program exceeded its time limit.
    TimedOut,
    /// The enforcer itself failed.
    InternalError,
    /// A status code this crate does not know.
    Other(String),
}

impl RunStatus {
    fn from_code(code: &str) -> Self {
        match code {
            "OK" => Self::Ok,
            "RE" => Self::RuntimeError,
            "SG" => Self::Signaled,
            "TO" => Self::TimedOut,
            "XX" => Self::InternalError,
            other => Self::Other(other.to_string()),
        }
    }
}

/// How the confined program ended, as far as the report tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
    /// Killed for exceeding a time limit.
    TimedOut,
    /// The enforcer reported an internal error.
    InternalError,
    /// The report does not say.
    Unknown,
}

/// Parsed run report.
///
/// A line without a colon is kept with a `None` value so callers can tell a
/// malformed field from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionReport {
    fields: BTreeMap<String, Option<String>>,
}

impl ExecutionReport {
    /// Parses report text, splitting each line on its first colon.
    pub fn parse(text: &str) -> Self {
        let mut fields = BTreeMap::new();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    fields.insert(key.to_string(), Some(value.to_string()));
                }
                None => {
                    tracing::warn!(line = %line, "malformed report line has no colon");
                    fields.insert(line.to_string(), None);
                }
            }
        }

        Self { fields }
    }

    /// Raw value for `key`; `None` if absent or malformed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }

    /// Returns true if `key` appeared in the report, even malformed.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All fields, in key order.
    pub fn fields(&self) -> &BTreeMap<String, Option<String>> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    // Timings are decimal seconds; keep microsecond precision.
    fn seconds(&self, key: &str) -> Option<Duration> {
        self.parsed::<f64>(key)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::from_micros((secs * 1_000_000.0).round() as u64))
    }

    /// The `status` code, if any.
    pub fn status(&self) -> Option<RunStatus> {
        self.get("status").map(|code| RunStatus::from_code(code.trim()))
    }

    /// CPU time used (`time`).
    pub fn cpu_time(&self) -> Option<Duration> {
        self.seconds("time")
    }

    /// Wall-clock time used (`time-wall`).
    pub fn wall_time(&self) -> Option<Duration> {
        self.seconds("time-wall")
    }

    /// Peak resident set size in KiB (`max-rss`).
    pub fn max_rss_kib(&self) -> Option<u64> {
        self.parsed("max-rss")
    }

    /// Peak control-group memory in KiB (`cg-mem`).
    pub fn cgroup_memory_kib(&self) -> Option<u64> {
        self.parsed("cg-mem")
    }

    /// Exit code of the program (`exitcode`).
    pub fn exit_code(&self) -> Option<i32> {
        self.parsed("exitcode")
    }

    /// Signal that killed the program (`exitsig`).
    pub fn exit_signal(&self) -> Option<i32> {
        self.parsed("exitsig")
    }

    /// Whether the enforcer killed the program (`killed`).
    pub fn killed(&self) -> bool {
        self.parsed::<u32>("killed").is_some_and(|k| k != 0)
    }

    /// Whether the cgroup OOM killer fired (`cg-oom-killed`).
    pub fn oom_killed(&self) -> bool {
        self.parsed::<u32>("cg-oom-killed").is_some_and(|k| k != 0)
    }

    /// Voluntary context switches (`csw-voluntary`).
    pub fn voluntary_context_switches(&self) -> Option<u64> {
        self.parsed("csw-voluntary")
    }

    /// Forced context switches (`csw-forced`).
    pub fn forced_context_switches(&self) -> Option<u64> {
        self.parsed("csw-forced")
    }

    /// Human-readable explanation from the enforcer (`message`).
    pub fn message(&self) -> Option<&str> {
        self.get("message")
    }

    /// Summarizes how the program ended.
    pub fn termination(&self) -> Termination {
        match self.status() {
            Some(RunStatus::TimedOut) => return Termination::TimedOut,
            Some(RunStatus::InternalError) => return Termination::InternalError,
            _ => {}
        }
        if let Some(signal) = self.exit_signal() {
            return Termination::Signaled(signal);
        }
        if let Some(code) = self.exit_code() {
            return Termination::Exited(code);
        }
        match self.status() {
            Some(RunStatus::Ok) => Termination::Exited(0),
            _ => Termination::Unknown,
        }
    }
}
