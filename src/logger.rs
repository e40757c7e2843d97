use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::Level;

use crate::config::ObserverSettings;

/// Daily-rotated log files under a single directory.
pub struct LogManager {
    log_dir: PathBuf,
}

impl LogManager {
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self, String> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;
        Ok(Self { log_dir })
    }

    pub fn current_log_file_path(&self) -> PathBuf {
        log_file_path(&self.log_dir, chrono::Local::now().date_naive())
    }

    pub fn writer(&self) -> DailyFileWriter {
        DailyFileWriter::new(self.log_dir.clone())
    }

    pub fn list_log_files(&self) -> Result<Vec<String>, String> {
        let entries = fs::read_dir(&self.log_dir)
            .map_err(|e| format!("Failed to read log directory: {}", e))?;

        let mut log_files: Vec<String> = entries
            .filter_map(|entry| {
                entry.ok().and_then(|e| {
                    let path = e.path();
                    if is_log_file(&path) {
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .map(|s| s.to_string())
                    } else {
                        None
                    }
                })
            })
            .collect();

        log_files.sort_by(|a, b| b.cmp(a)); // Most recent first
        Ok(log_files)
    }

    pub fn read_log_file(&self, filename: &str) -> Result<String, String> {
        let path = self.log_dir.join(filename);

        if !path.exists() || !path.is_file() {
            return Err("Log file not found".to_string());
        }

        fs::read_to_string(path).map_err(|e| format!("Failed to read log file: {}", e))
    }

    pub fn clear_all_logs(&self) -> Result<(), String> {
        let entries = fs::read_dir(&self.log_dir)
            .map_err(|e| format!("Failed to read log directory: {}", e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if is_log_file(&path) {
                fs::remove_file(path).map_err(|e| format!("Failed to delete log file: {}", e))?;
            }
        }

        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("app-{}.txt", date.format("%Y-%m-%d")))
}

/// Appends to `app-YYYY-MM-DD.txt`, switching files when the local date changes.
#[derive(Clone)]
pub struct DailyFileWriter {
    log_dir: PathBuf,
    current: Arc<Mutex<Option<(PathBuf, File)>>>,
}

impl DailyFileWriter {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn write_dated(&self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let path = log_file_path(&self.log_dir, date);
        let mut current = self
            .current
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Lock error: {}", e)))?;

        let needs_new_file = match current.as_ref() {
            Some((open_path, _)) => open_path != &path || !path.exists(),
            None => true,
        };
        if needs_new_file {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *current = Some((path, file));
        }

        match current.as_mut() {
            Some((_, file)) => file.write(buf),
            None => Ok(0),
        }
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_dated(chrono::Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Lock error: {}", e)))?;
        match current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

fn is_log_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("txt")
}

fn parse_level(raw: &str) -> Level {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to today's file under `settings.log_dir` when set, stderr otherwise.
/// Returns the `LogManager` for the file case.
pub fn init_logging(settings: &ObserverSettings) -> anyhow::Result<Option<LogManager>> {
    let level = parse_level(&settings.log_level);
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    match &settings.log_dir {
        Some(dir) => {
            let manager = LogManager::new(dir).map_err(anyhow::Error::msg)?;
            let writer = manager.writer();
            builder
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
            Ok(Some(manager))
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
            Ok(None)
        }
    }
}
