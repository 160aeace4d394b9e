//! Watches the corpus directory so a serving process can swap its snapshot
//! after a build replaces the files.

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use notify_debouncer_mini::notify;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::warn;

use crate::corpus::{Corpus, CorpusError};

/// Watches `dir` and calls `on_swap` with a freshly loaded corpus whenever
/// the files change (debounced). Blocks until the watcher is stopped
/// (e.g. Ctrl+C). Returns Ok when stopped, Err on setup failure.
pub fn watch_corpus(
    dir: &Path,
    on_swap: impl Fn(Result<Corpus, CorpusError>) + Send + 'static,
) -> Result<(), WatchError> {
    if !dir.is_dir() {
        return Err(WatchError::NotADirectory(dir.to_path_buf()));
    }
    let dir = dir.canonicalize().map_err(WatchError::Canonicalize)?;
    let dir_for_callback = dir.clone();

    let debounce = Duration::from_millis(400);
    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(_) => on_swap(Corpus::load(&dir_for_callback)),
        Err(e) => warn!(error = %e, "corpus watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&dir, notify::RecursiveMode::NonRecursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;

    let (_tx, rx) = mpsc::channel::<()>();
    rx.recv().ok();
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(std::path::PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}
