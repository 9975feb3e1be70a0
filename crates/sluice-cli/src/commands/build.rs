//! `sluice build` command implementation.

use super::{fail, Project};
use miette::Result;
use serde::Serialize;
use sluice_core::error::codes;
use sluice_core::{BuildError, CycleOutcome, Error, ReloadChannel};

/// JSON output for the build command.
#[derive(Serialize)]
struct BuildResultJson {
    ok: bool,
    environment: String,
    output: String,
    size_bytes: usize,
    hash: String,
    duration_ms: u64,
}

/// Run one cycle. Any error is fatal.
pub fn run(project: &Project, json: bool) -> Result<()> {
    let session = project
        .prepare(ReloadChannel::new())
        .unwrap_or_else(|err| fail(&err, json));

    match session.cycle() {
        Ok(CycleOutcome::Built {
            path,
            bytes,
            hash,
            duration,
        }) => {
            let duration_ms = duration.as_millis() as u64;
            if json {
                let result = BuildResultJson {
                    ok: true,
                    environment: project.environment.clone(),
                    output: path.display().to_string(),
                    size_bytes: bytes,
                    hash,
                    duration_ms,
                };
                println!("{}", serde_json::to_string(&result).unwrap_or_default());
            } else {
                let entry = session.config().entry_path();
                let shown = entry.strip_prefix(&project.cwd).unwrap_or(&entry);
                let out = path.strip_prefix(&project.cwd).unwrap_or(&path);
                println!(
                    "  {} -> {} ({:.1}KB, {}ms)",
                    shown.display(),
                    out.display(),
                    bytes as f64 / 1024.0,
                    duration_ms
                );
            }
            Ok(())
        }
        Ok(CycleOutcome::Failed { message }) => fail(
            &Error::from(BuildError::new(codes::BUILD_INTERNAL_ERROR, message)),
            json,
        ),
        Err(err) => fail(&err, json),
    }
}
