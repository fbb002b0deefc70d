use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WatchSignal {
    Changed,
    Error(String),
}

/// Filesystem wake-ups for one log file. Dropping it stops the watch.
#[derive(Debug)]
pub struct LogWatcher {
    _watcher: RecommendedWatcher,
    rx: UnboundedReceiver<WatchSignal>,
}

impl LogWatcher {
    pub async fn changed(&mut self) -> Option<WatchSignal> {
        self.rx.recv().await
    }
}

#[derive(Debug, Error)]
pub enum WatchLogError {
    #[error("log path has no file name: {0}")]
    NoFileName(String),

    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches the parent directory so that a log recreated by its producer keeps signalling.
pub fn watch_log_file(path: &Path) -> Result<LogWatcher, WatchLogError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| WatchLogError::NoFileName(path.display().to_string()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let (tx, rx) = unbounded_channel::<WatchSignal>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if touches_log(&event, &file_name) {
                    let _ = tx.send(WatchSignal::Changed);
                }
            }
            Err(error) => {
                let _ = tx.send(WatchSignal::Error(error.to_string()));
            }
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    Ok(LogWatcher {
        _watcher: watcher,
        rx,
    })
}

fn touches_log(event: &notify::Event, file_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
