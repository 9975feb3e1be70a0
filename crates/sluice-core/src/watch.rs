//! Watch mode.
//!
//! A notify watcher thread turns file-system events under the scripts
//! directory into debounced change batches. The [`WatchController`] consumes
//! them and runs at most one cycle at a time; batches that arrive while a
//! cycle runs are folded into a single follow-up cycle.

use crate::cycle::{CycleOutcome, Session};
use crate::error::{codes, BuildError, Error, Result};
use crate::sink::ErrorSink;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Quiet period that closes a change batch.
pub const DEBOUNCE: Duration = Duration::from_millis(50);

/// File extensions whose changes trigger a rebuild.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs", "json", "ts", "tsx", "coffee"];

/// Changed paths, deduplicated and sorted.
pub type ChangeBatch = Vec<PathBuf>;

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Rebuilding,
}

/// Owns the rebuild lifecycle.
///
/// The controller is the only writer of the distribution directory and the
/// only sender on the reload channel.
pub struct WatchController {
    session: Arc<Session>,
    sink: Arc<ErrorSink>,
    state: watch::Sender<State>,
}

impl WatchController {
    pub fn new(session: Arc<Session>, sink: Arc<ErrorSink>) -> Self {
        let (state, _) = watch::channel(State::Idle);
        Self {
            session,
            sink,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn sink(&self) -> &ErrorSink {
        &self.sink
    }

    /// Run a single cycle. Failures are reported to the sink, never returned.
    pub async fn run_once(&self) -> CycleOutcome {
        let joined = self.spawn_cycle().await;
        self.complete(joined)
    }

    /// Rebuild on every change batch until `changes` closes.
    ///
    /// Returns the number of cycles run.
    pub async fn run(&self, mut changes: mpsc::Receiver<ChangeBatch>) -> usize {
        let mut cycles = 0;
        let mut open = true;

        while open {
            let Some(batch) = changes.recv().await else {
                break;
            };
            debug!(files = batch.len(), "change batch");

            let mut rerun = true;
            while rerun {
                rerun = false;
                let mut handle = self.spawn_cycle();
                let joined = loop {
                    tokio::select! {
                        joined = &mut handle => break joined,
                        batch = changes.recv(), if open => match batch {
                            Some(batch) => {
                                debug!(files = batch.len(), "change during rebuild, queued");
                                rerun = true;
                            }
                            None => open = false,
                        },
                    }
                };
                self.complete(joined);
                cycles += 1;

                // Batches that landed as the cycle finished join the follow-up.
                loop {
                    match changes.try_recv() {
                        Ok(_) => rerun = true,
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            open = false;
                            break;
                        }
                    }
                }
            }
        }

        debug!(cycles, "change source closed");
        cycles
    }

    fn spawn_cycle(&self) -> tokio::task::JoinHandle<Result<CycleOutcome>> {
        self.state.send_replace(State::Rebuilding);
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || session.cycle())
    }

    fn complete(&self, joined: std::result::Result<Result<CycleOutcome>, JoinError>) -> CycleOutcome {
        let result = joined.unwrap_or_else(|e| {
            Err(Error::from(BuildError::new(
                codes::BUILD_INTERNAL_ERROR,
                format!("build task failed: {e}"),
            )))
        });
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => CycleOutcome::Failed {
                message: self.sink.report(&err),
            },
        };
        self.state.send_replace(State::Idle);
        outcome
    }
}

impl std::fmt::Debug for WatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchController")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Watch `dir` recursively and deliver debounced batches of changed script
/// files.
///
/// The watcher thread exits once the receiver is dropped and another event
/// arrives.
pub fn watch_scripts(dir: &Path) -> Result<mpsc::Receiver<ChangeBatch>> {
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(event_tx, Config::default())?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    info!(root = %dir.display(), "Watching directory");

    let (batch_tx, batch_rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("sluice-watch".to_string())
        .spawn(move || {
            let _watcher = watcher;
            forward_batches(&event_rx, &batch_tx);
        })
        .map_err(|e| Error::io(dir, e))?;
    Ok(batch_rx)
}

fn forward_batches(
    events: &std::sync::mpsc::Receiver<notify::Result<Event>>,
    batches: &mpsc::Sender<ChangeBatch>,
) {
    let mut pending = BTreeSet::new();
    loop {
        let received = if pending.is_empty() {
            events.recv().map_err(|_| std::sync::mpsc::RecvTimeoutError::Disconnected)
        } else {
            events.recv_timeout(DEBOUNCE)
        };

        match received {
            Ok(Ok(event)) => {
                if is_content_change(&event.kind) {
                    pending.extend(event.paths.into_iter().filter(|p| is_script(p)));
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Watch error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                let batch: ChangeBatch = std::mem::take(&mut pending).into_iter().collect();
                if batches.blocking_send(batch).is_err() {
                    break;
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("watcher thread exiting");
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => !matches!(modify, ModifyKind::Metadata(_)),
        _ => false,
    }
}

/// Script-like file that is not hidden (editor swap files, our own temp
/// writes).
fn is_script(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    !hidden && SCRIPT_EXTENSIONS.contains(&ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    #[test]
    fn script_filter() {
        assert!(is_script(Path::new("/p/src/js/main.js")));
        assert!(is_script(Path::new("/p/src/js/data.json")));
        assert!(!is_script(Path::new("/p/src/js/.main.js.swp")));
        assert!(!is_script(Path::new("/p/src/js/.main.js.sluice-42")));
        assert!(!is_script(Path::new("/p/src/js/readme.md")));
        assert!(!is_script(Path::new("/p/src/js/Makefile")));
    }

    #[test]
    fn only_content_changes_count() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn events_are_debounced_into_one_batch() {
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let thread = std::thread::spawn(move || forward_batches(&event_rx, &batch_tx));

        let modify = |path: &str| {
            Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(PathBuf::from(path)))
        };
        event_tx.send(modify("/p/b.js")).unwrap();
        event_tx.send(modify("/p/a.js")).unwrap();
        event_tx.send(modify("/p/a.js")).unwrap();
        event_tx.send(modify("/p/notes.txt")).unwrap();

        let batch = batch_rx.blocking_recv().unwrap();
        assert_eq!(batch, vec![PathBuf::from("/p/a.js"), PathBuf::from("/p/b.js")]);

        drop(event_tx);
        thread.join().unwrap();
    }
}
