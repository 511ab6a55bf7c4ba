//! In-process stand-in for the isolate binary.
//!
//! It keeps boxes under a temp directory and answers `--run` from a small
//! table of fake programs, so lifecycle tests need no root and no isolate.

#![allow(dead_code)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use boxpool::{Enforcer, EnforcerOutput, Result};

pub struct FakeIsolate {
    root: PathBuf,
    failing_init: HashSet<u32>,
    running: Mutex<HashSet<u32>>,
    overlaps: AtomicUsize,
    runs: AtomicUsize,
    invocations: Mutex<Vec<Vec<String>>>,
}

impl FakeIsolate {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            failing_init: HashSet::new(),
            running: Mutex::new(HashSet::new()),
            overlaps: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Makes `--init` fail for these boxes.
    pub fn failing_init(mut self, ids: &[u32]) -> Self {
        self.failing_init.extend(ids.iter().copied());
        self
    }

    /// Number of times two runs used the same box at once.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }

    fn box_dir(&self, id: u32) -> PathBuf {
        self.root.join(id.to_string()).join("box")
    }

    fn run(&self, id: u32, args: &[String]) -> EnforcerOutput {
        let box_dir = self.box_dir(id);
        if !box_dir.is_dir() {
            return exit(2, "Box not initialized");
        }

        if !self.running.lock().unwrap().insert(id) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.runs.fetch_add(1, Ordering::SeqCst);

        let meta = flag(args, "--meta=").map(PathBuf::from);
        let stdout = flag(args, "--stdout=").map(|p| box_dir.join(p));
        let stderr = flag(args, "--stderr=").map(|p| box_dir.join(p));
        let split = args.iter().position(|a| a == "--").map_or(args.len(), |i| i + 1);
        let argv = &args[split..];

        let (report, out, err, code) = match argv.first().map(String::as_str) {
            Some("echo") => (
                "time:0.001\ntime-wall:0.004\nmax-rss:1024\nexitcode:0\n".to_string(),
                format!("{}\n", argv[1..].join(" ")),
                String::new(),
                0,
            ),
            Some("emit") => {
                std::fs::write(box_dir.join("_functionOutput.txt"), argv[1..].join(" ")).unwrap();
                ("exitcode:0\n".to_string(), String::new(), String::new(), 0)
            }
            Some("fail") => (
                "time:0.002\nexitcode:1\nstatus:RE\nmessage:Exited with error status 1\n"
                    .to_string(),
                String::new(),
                "boom\n".to_string(),
                1,
            ),
            Some("sleep") => (
                "time:0.000\ntime-wall:600.013\nkilled:1\nstatus:TO\nmessage:Time limit exceeded (wall clock)\n"
                    .to_string(),
                String::new(),
                String::new(),
                1,
            ),
            Some("vanish") => {
                self.running.lock().unwrap().remove(&id);
                return exit(2, "internal error");
            }
            _ => (
                "status:RE\nexitcode:127\n".to_string(),
                String::new(),
                "command not found\n".to_string(),
                1,
            ),
        };

        std::thread::sleep(Duration::from_millis(2));

        if let Some(meta) = meta {
            std::fs::write(meta, report).unwrap();
        }
        if let Some(path) = stdout {
            std::fs::write(path, out).unwrap();
        }
        if let Some(path) = stderr {
            std::fs::write(path, err).unwrap();
        }

        self.running.lock().unwrap().remove(&id);
        exit(code, "")
    }
}

impl Enforcer for FakeIsolate {
    fn invoke(&self, args: &[OsString]) -> Result<EnforcerOutput> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.invocations.lock().unwrap().push(args.clone());

        let id: u32 = flag(&args, "--box-id=")
            .and_then(|v| v.parse().ok())
            .expect("every invocation names a box");

        if has(&args, "--cleanup") {
            match std::fs::remove_dir_all(self.root.join(id.to_string())) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Ok(exit(1, &e.to_string())),
            }
            return Ok(exit(0, ""));
        }
        if has(&args, "--init") {
            if self.failing_init.contains(&id) {
                return Ok(exit(2, "Cannot create control group"));
            }
            std::fs::create_dir_all(self.box_dir(id))?;
            return Ok(exit(0, ""));
        }
        Ok(self.run(id, &args))
    }

    fn name(&self) -> &str {
        "fake-isolate"
    }
}

// Options end at `--`; anything after belongs to the confined command.
fn flag<'a>(args: &'a [String], prefix: &str) -> Option<&'a str> {
    args.iter()
        .take_while(|a| *a != "--")
        .find_map(|a| a.strip_prefix(prefix))
}

fn has(args: &[String], option: &str) -> bool {
    args.iter().take_while(|a| *a != "--").any(|a| a == option)
}

fn exit(code: i32, stderr: &str) -> EnforcerOutput {
    EnforcerOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
