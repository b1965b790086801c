use crate::error::AnyResult;
use crate::scanner::is_audio_file;
use log::{debug, info, warn};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

const IGNORED_SUFFIXES: [&str; 5] = [".tmp", ".lock", ".part", ".crdownload", "~"];

/// Whether a change at `path` can affect a scan: audio files and
/// directories, minus temp, lock and hidden files.
pub fn is_relevant_path(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if name.starts_with('.') || name.contains(".tmp") {
        return false;
    }
    if IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return false;
    }
    // Removed directories cannot be stat'ed, so extensionless names count.
    is_audio_file(path) || path.is_dir() || path.extension().is_none()
}

/// Trailing-edge debounce: a burst of events fires once, after the source
/// has been quiet for a whole window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// How long to wait before the pending burst settles, `None` when idle.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.last_event
            .map(|last| self.window.saturating_sub(now.saturating_duration_since(last)))
    }

    /// True once per burst, when the window has passed since its last event.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.last_event {
            Some(last) if now.saturating_duration_since(last) >= self.window => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }
}

/// Watches `root` recursively, blocking the calling thread. Each burst of
/// relevant events is reported once, with every path it touched, after
/// `debounce` passes without further events. Stops when `on_change`
/// returns `ControlFlow::Break`.
pub fn watch_source<F>(root: &Path, debounce: Duration, mut on_change: F) -> AnyResult<()>
where
    F: FnMut(&[PathBuf]) -> ControlFlow<()>,
{
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(tx, Config::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!("Watching source folder {:?}", root);

    let mut debouncer = Debouncer::new(debounce);
    let mut changed: Vec<PathBuf> = Vec::new();

    loop {
        let received = match debouncer.time_until_ready(Instant::now()) {
            Some(wait) => rx.recv_timeout(wait),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Ok(event)) => {
                let relevant: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .filter(|p| is_relevant_path(p))
                    .collect();
                if !relevant.is_empty() {
                    debug!("Change pending: {:?} {:?}", event.kind, relevant);
                    debouncer.record(Instant::now());
                    for path in relevant {
                        if !changed.contains(&path) {
                            changed.push(path);
                        }
                    }
                }
            }
            Ok(Err(e)) => warn!("Watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if debouncer.take_ready(Instant::now()) {
            info!("Detected {} changed paths in source folder", changed.len());
            let paths = std::mem::take(&mut changed);
            if on_change(&paths).is_break() {
                break;
            }
        }
    }

    if debouncer.is_pending() {
        debug!("Watcher closed with {} unreported paths", changed.len());
    }
    info!("Stopped watching {:?}", root);
    Ok(())
}
