//! Filesystem layout of one box.
//!
//! These names are shared with the enforcer and with whatever runs inside
//! the box, so changing them breaks both sides.

use std::path::{Path, PathBuf};

use crate::pool::BoxId;

/// Run report written by the enforcer.
pub const REPORT_FILE: &str = "meta.txt";
/// Captured standard output of the confined program.
pub const STDOUT_FILE: &str = "_standardOutput.txt";
/// Captured standard error of the confined program.
pub const STDERR_FILE: &str = "_standardError.txt";
/// Structured result the confined program may write.
pub const FUNCTION_OUTPUT_FILE: &str = "_functionOutput.txt";

/// Paths derived from a box id and the isolation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxLayout {
    root: PathBuf,
}

impl BoxLayout {
    /// Layout of box `id` under `isolation_root`: `<isolation_root>/<id>/box`.
    pub fn new(isolation_root: &Path, id: BoxId) -> Self {
        Self {
            root: isolation_root.join(id.to_string()).join("box"),
        }
    }

    /// The box root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a file inside the box root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn report(&self) -> PathBuf {
        self.file(REPORT_FILE)
    }

    pub fn stdout(&self) -> PathBuf {
        self.file(STDOUT_FILE)
    }

    pub fn stderr(&self) -> PathBuf {
        self.file(STDERR_FILE)
    }

    pub fn function_output(&self) -> PathBuf {
        self.file(FUNCTION_OUTPUT_FILE)
    }
}
