//! Executables from `node_modules/.bin` used as stdin→stdout filters.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Location of an installed package executable.
#[must_use]
pub fn bin_path(project_root: &Path, name: &str) -> PathBuf {
    let bin_dir = project_root.join("node_modules").join(".bin");
    if cfg!(windows) {
        bin_dir.join(format!("{name}.cmd"))
    } else {
        bin_dir.join(name)
    }
}

/// An external filter program plus its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFilter {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ExternalFilter {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Feed `input` on stdin and return stdout.
    ///
    /// `extra_args` are appended after the fixed arguments. A non-zero exit
    /// status is an error carrying the program's stderr.
    pub fn run(&self, input: &str, extra_args: &[&str]) -> Result<String, String> {
        debug!(program = %self.program.display(), "running external filter");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(extra_args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "failed to capture stdin".to_string())?;
        let input = input.to_owned();
        // Filters may fill stdout before draining stdin.
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for {}: {e}", self.program.display()))?;
        if let Ok(Err(e)) = writer.join() {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(format!("failed to write to {}: {e}", self.program.display()));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
