//! Collected results of one run.

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::pool::BoxId;

use super::report::{ExecutionReport, Termination};

/// The output artifacts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutputs {
    /// Standard output of the confined program.
    #[serde(serialize_with = "lossy")]
    pub stdout: Vec<u8>,
    /// Standard error of the confined program.
    #[serde(serialize_with = "lossy")]
    pub stderr: Vec<u8>,
    /// Result payload, present only if the program wrote one.
    #[serde(serialize_with = "lossy_opt")]
    pub function_output: Option<Vec<u8>>,
}

impl CapturedOutputs {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn function_output_lossy(&self) -> Option<String> {
        self.function_output
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

fn lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn lossy_opt<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => lossy(bytes, serializer),
        None => serializer.serialize_none(),
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Identifier of this run, for log correlation.
    pub run_id: Uuid,
    /// The box the run used.
    pub box_id: BoxId,
    /// How the program ended, derived from the report.
    pub termination: Termination,
    /// The enforcer's report.
    pub report: ExecutionReport,
    /// The captured artifacts.
    pub outputs: CapturedOutputs,
}

impl ExecutionOutcome {
    /// Returns true if the program exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.termination == Termination::Exited(0)
    }
}
