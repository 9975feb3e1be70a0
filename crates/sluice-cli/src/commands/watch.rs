//! `sluice watch` command implementation.
//!
//! Builds once, then rebuilds on every change under the scripts directory
//! until interrupted. Build errors are reported and the watcher keeps going;
//! configuration and resolution errors abort before watching starts.

use super::{fail, Project};
use miette::{IntoDiagnostic, Result};
use sluice_core::{
    watch_scripts, ErrorSink, ReloadChannel, ReloadMessage, TerminalNotifier, WatchController,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, info, warn};

pub fn run(project: &Project, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(watch(project, json))
}

async fn watch(project: &Project, json: bool) -> Result<()> {
    let reload = ReloadChannel::new();
    let session = project
        .prepare(reload.clone())
        .unwrap_or_else(|err| fail(&err, json));
    let scripts = session.config().scripts_dir();

    let printer = tokio::spawn(print_reloads(reload.subscribe(), project.cwd.clone(), json));

    let sink = ErrorSink::new(Arc::new(TerminalNotifier), reload);
    let controller = WatchController::new(Arc::new(session), Arc::new(sink));

    controller.run_once().await;
    let changes = watch_scripts(&scripts).unwrap_or_else(|err| fail(&err, json));
    if !json {
        println!();
        println!("  Watching {} for changes", relative(&scripts, &project.cwd));
        println!("  Press Ctrl+C to stop");
        println!();
    }

    tokio::select! {
        cycles = controller.run(changes) => {
            debug!(cycles, "change source closed");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.into_diagnostic()?;
            info!("Stopping");
        }
    }

    printer.abort();
    Ok(())
}

/// Print one line (or JSON object) per reload message.
async fn print_reloads(mut rx: Receiver<ReloadMessage>, cwd: PathBuf, json: bool) {
    loop {
        match rx.recv().await {
            Ok(message) if json => {
                println!("{}", serde_json::to_string(&message).unwrap_or_default());
            }
            Ok(ReloadMessage::Reload { path }) => {
                println!("  rebuilt {}", relative(&path, &cwd));
            }
            // Already rendered by the error sink.
            Ok(ReloadMessage::Error { .. }) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "reload messages dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn relative(path: &Path, cwd: &Path) -> String {
    path.strip_prefix(cwd).unwrap_or(path).display().to_string()
}
