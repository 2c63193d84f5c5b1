use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Audit trail the watchdog writes to.
///
/// Passed explicitly to every component that records activity; there is no
/// global writer.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);

    /// Timestamp and append every line of `text` separately.
    fn log_multiline(&self, text: &str);
}

/// Appends timestamped lines to a file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(file: &mut File, message: &str) {
        let stamp = Local::now().format("%m/%d/%y %I:%M:%S %p %Z");
        let result = writeln!(file, "{} {}", stamp, message).and_then(|_| file.flush());
        if let Err(e) = result {
            log::error!("Failed to write audit log entry: {}", e);
        }
    }
}

impl LogSink for FileSink {
    fn log(&self, message: &str) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write_line(&mut file, message);
    }

    fn log_multiline(&self, text: &str) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        for line in text.lines() {
            Self::write_line(&mut file, line);
        }
    }
}

/// Captures entries in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }

    fn log_multiline(&self, text: &str) {
        let mut lines = self.lines.lock().unwrap();
        lines.extend(text.lines().map(str::to_string));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_appends_timestamped_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::open(&path).unwrap();

        sink.log("first");
        sink.log("second");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
        // "MM/DD/YY HH:MM:SS AM/PM <tz> message"
        assert_eq!(&lines[0][2..3], "/");
        assert_eq!(&lines[0][5..6], "/");
    }

    #[test]
    fn test_file_sink_multiline_stamps_each_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::open(&path).unwrap();

        sink.log_multiline("alpha\nbeta\ngamma\n");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with(" gamma"));
    }

    #[test]
    fn test_file_sink_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        std::fs::write(&path, "existing\n").unwrap();

        let sink = FileSink::open(&path).unwrap();
        sink.log("new");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing\n"));
        assert!(contents.trim_end().ends_with(" new"));
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn test_file_sink_open_missing_directory_fails() {
        let err = FileSink::open(Path::new("/nonexistent-dir/impossible/audit.log"));
        assert!(err.is_err());
    }
}
