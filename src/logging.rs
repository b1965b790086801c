use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

/// Maximum size per log file before rotation (~5 MB)
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;
/// Number of rotated log files to keep
const MAX_LOG_FILES: usize = 5;
/// In-memory log buffer cap
const MAX_MEMORY_LOGS: usize = 2000;

const LOG_FILE_STEM: &str = "rekordsync";

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// `log` backend: keeps recent entries in memory, appends everything to a
/// rotating file and echoes warnings and errors to stderr.
pub struct SessionLogger {
    entries: Mutex<Vec<LogEntry>>,
    log_dir: Option<PathBuf>,
    debug_mode: AtomicBool,
}

impl SessionLogger {
    /// A logger writing under `log_dir`, or memory-only when `None` or the
    /// directory cannot be created.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        let log_dir = log_dir.and_then(|dir| match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                eprintln!("[SessionLogger] Failed to create log directory {:?}: {}", dir, e);
                None
            }
        });

        Self {
            entries: Mutex::new(Vec::new()),
            log_dir,
            debug_mode: AtomicBool::new(false),
        }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// The current (active) log file path.
    pub fn current_log_path(&self) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", LOG_FILE_STEM)))
    }

    /// Rotate log files: rekordsync.log → rekordsync.1.log → rekordsync.2.log → …
    fn rotate_if_needed(&self) {
        let (Some(dir), Some(current)) = (self.log_dir.as_ref(), self.current_log_path()) else {
            return;
        };
        let file_size = fs::metadata(&current).map(|m| m.len()).unwrap_or(0);
        if file_size < MAX_LOG_FILE_SIZE {
            return;
        }

        for i in (1..MAX_LOG_FILES).rev() {
            let from = dir.join(format!("{}.{}.log", LOG_FILE_STEM, i));
            let to = dir.join(format!("{}.{}.log", LOG_FILE_STEM, i + 1));
            let _ = fs::rename(&from, &to);
        }
        let _ = fs::rename(&current, dir.join(format!("{}.1.log", LOG_FILE_STEM)));
    }

    /// Append a formatted line to the persistent log file.
    fn write_to_file(&self, level: &str, message: &str) {
        self.rotate_if_needed();
        let Some(path) = self.current_log_path() else { return };

        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            message
        );

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = file.write_all(line.as_bytes());
        }
    }

    /// Records one entry in memory and on disk. Debug entries are dropped
    /// while debug mode is off.
    pub fn record(&self, level: Level, message: &str) {
        if level > Level::Info && !self.is_debug() {
            return;
        }

        let entry = LogEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level: level.as_str().to_string(),
            message: message.to_string(),
        };

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
            if entries.len() > MAX_MEMORY_LOGS {
                let drain_count = MAX_MEMORY_LOGS / 5;
                entries.drain(..drain_count);
            }
        }

        self.write_to_file(level.as_str(), message);

        if level <= Level::Warn {
            eprintln!("[{}] {}", level, message);
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_debug(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        let was = self.debug_mode.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            self.record(
                Level::Info,
                &format!("Debug mode {}", if enabled { "ENABLED" } else { "DISABLED" }),
            );
        }
    }

    fn write_session_marker(&self) {
        self.write_to_file(
            "INFO",
            &format!(
                "=== rekordsync session started at {} ===",
                Local::now().format("%Y-%m-%d %H:%M:%S %Z")
            ),
        );
    }

    /// Size and file count of the log directory.
    pub fn stats(&self) -> Option<LogStats> {
        let dir = self.log_dir.as_ref()?;
        let current_path = self.current_log_path()?;

        let mut total_size: u64 = 0;
        let mut file_count: usize = 0;

        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.is_file() {
                        total_size += meta.len();
                        file_count += 1;
                    }
                }
            }
        }

        let current_size = fs::metadata(&current_path).map(|m| m.len()).unwrap_or(0);

        Some(LogStats {
            log_dir: dir.to_string_lossy().to_string(),
            total_size_bytes: total_size,
            file_count,
            current_file_size_bytes: current_size,
        })
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || self.is_debug()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.record(record.level(), &record.args().to_string());
        }
    }

    fn flush(&self) {}
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub log_dir: String,
    pub total_size_bytes: u64,
    pub file_count: usize,
    pub current_file_size_bytes: u64,
}

/// Installs the process-wide logger and writes a session marker.
/// Fails if another logger is already installed.
pub fn init(log_dir: Option<PathBuf>, debug: bool) -> Result<&'static SessionLogger, SetLoggerError> {
    let logger = LOGGER.get_or_init(|| SessionLogger::new(log_dir));
    log::set_logger(logger)?;
    log::set_max_level(LevelFilter::Debug);
    logger.write_session_marker();
    logger.set_debug(debug);
    Ok(logger)
}

/// The installed logger, once `init` succeeded.
pub fn logger() -> Option<&'static SessionLogger> {
    LOGGER.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn debug_entries_need_debug_mode() {
        let logger = SessionLogger::new(None);
        logger.record(Level::Debug, "hidden");
        logger.record(Level::Info, "shown");
        assert_eq!(logger.entries().len(), 1);

        logger.set_debug(true);
        logger.record(Level::Debug, "now visible");
        let messages: Vec<String> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["shown", "Debug mode ENABLED", "now visible"]);
    }

    #[test]
    fn memory_buffer_drops_the_oldest_fifth() {
        let logger = SessionLogger::new(None);
        for i in 0..=MAX_MEMORY_LOGS {
            logger.record(Level::Info, &format!("line {}", i));
        }

        let entries = logger.entries();
        assert_eq!(entries.len(), MAX_MEMORY_LOGS + 1 - MAX_MEMORY_LOGS / 5);
        assert_eq!(entries[0].message, format!("line {}", MAX_MEMORY_LOGS / 5));
    }

    #[test]
    fn records_land_in_the_log_file() {
        let dir = TempDir::new().unwrap();
        let logger = SessionLogger::new(Some(dir.path().join("logs")));
        logger.log(
            &Record::builder()
                .args(format_args!("scanned {} files", 3))
                .level(Level::Warn)
                .build(),
        );

        let text = fs::read_to_string(logger.current_log_path().unwrap()).unwrap();
        assert!(text.contains("[WARN] scanned 3 files"));
        assert_eq!(logger.stats().unwrap().file_count, 1);
    }

    #[test]
    fn full_log_file_is_rotated() {
        let dir = TempDir::new().unwrap();
        let logger = SessionLogger::new(Some(dir.path().to_path_buf()));
        let current = logger.current_log_path().unwrap();
        fs::write(&current, vec![b'x'; MAX_LOG_FILE_SIZE as usize]).unwrap();
        fs::write(dir.path().join("rekordsync.1.log"), b"older").unwrap();

        logger.record(Level::Info, "fresh start");

        assert_eq!(fs::read(dir.path().join("rekordsync.2.log")).unwrap(), b"older");
        assert_eq!(
            fs::metadata(dir.path().join("rekordsync.1.log")).unwrap().len(),
            MAX_LOG_FILE_SIZE
        );
        let stats = logger.stats().unwrap();
        assert_eq!(stats.file_count, 3);
        assert!(stats.current_file_size_bytes < 100);
    }
}
