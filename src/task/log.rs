use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use console::style;

use crate::error::TaskLogError;

/// Severity of a message written to a [`TaskLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Log sink shared by a collection of tasks.
///
/// Every message is emitted as a `tracing` event. Optionally it is also
/// printed to stdout and appended to a log file. Writing to the sinks is
/// best effort and never changes the outcome of a task.
#[derive(Debug)]
pub struct TaskLogger {
    name: String,
    print_to_std: bool,
    path: Option<Utf8PathBuf>,
    file: Mutex<Option<File>>,
}

impl Default for TaskLogger {
    fn default() -> Self {
        Self::new("")
    }
}

impl TaskLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            print_to_std: false,
            path: None,
            file: Mutex::new(None),
        }
    }

    pub(crate) fn with_print_to_std(mut self, print_to_std: bool) -> Self {
        self.print_to_std = print_to_std;
        self
    }

    pub(crate) fn with_path(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.path = path;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Level::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message.as_ref());
    }

    pub fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(tasks = %self.name, "{message}"),
            Level::Warning => tracing::warn!(tasks = %self.name, "{message}"),
            Level::Error => tracing::error!(tasks = %self.name, "{message}"),
        }

        if self.print_to_std {
            match level {
                Level::Info => println!("{message}"),
                Level::Warning => println!("{}", style(message).yellow()),
                Level::Error => println!("{}", style(message).red()),
            }
        }

        let mut file = self.file.lock().unwrap();
        if let Some(file) = file.as_mut()
            && let Err(e) = writeln!(file, "{message}")
        {
            tracing::warn!(tasks = %self.name, "couldn't write to the log file: {e}");
        }
    }

    /// Deletes the log file and opens a fresh one in append mode.
    pub fn clear(&self) -> Result<(), TaskLogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = self.file.lock().unwrap();
        *file = None;

        if path.exists() {
            fs::remove_file(path).map_err(|e| TaskLogError::Remove(path.clone(), e))?;
        }

        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TaskLogError::Open(path.clone(), e))?;

        *file = Some(handle);
        Ok(())
    }

    /// Flushes and closes the log file, later messages only reach `tracing`
    /// and stdout until the next [`clear`](Self::clear).
    pub fn close(&self) {
        let mut file = self.file.lock().unwrap();
        if let Some(mut handle) = file.take()
            && let Err(e) = handle.flush()
        {
            tracing::warn!(tasks = %self.name, "couldn't flush the log file: {e}");
        }
    }

    /// Reads the log file. With `max_lines`, at most that many lines are
    /// returned, followed by a notice pointing to the file if it was cut.
    pub fn read(&self, max_lines: Option<usize>) -> Result<String, TaskLogError> {
        let Some(path) = &self.path else {
            return Ok(String::new());
        };

        if !path.exists() {
            return Ok(String::new());
        }

        let err = |e| TaskLogError::Read(path.clone(), e);
        let file = File::open(path).map_err(err)?;
        let mut reader = BufReader::new(file);

        let Some(max_lines) = max_lines else {
            let mut content = String::new();
            reader.read_to_string(&mut content).map_err(err)?;
            return Ok(content);
        };

        let mut content = String::new();
        let mut count = 0;
        while count < max_lines {
            let read = reader.read_line(&mut content).map_err(err)?;
            if read == 0 {
                break;
            }
            count += 1;
        }

        if count == max_lines {
            content.push_str("\n\n");
            content.push_str(&format!(
                "The log can't be displayed completely. See **{}** for more details.",
                path.file_name().unwrap_or(path.as_str())
            ));
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8Path::from_path(dir.path()).unwrap().join("tasks.log")
    }

    #[test]
    fn test_without_file_reads_nothing() {
        let logger = TaskLogger::new("plain");
        logger.info("nowhere to go");
        assert_eq!(logger.read(None).unwrap(), "");
    }

    #[test]
    fn test_clear_then_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_log(&dir);
        fs::write(&path, "stale\n").unwrap();

        let logger = TaskLogger::new("file").with_path(Some(path.clone()));
        logger.clear().unwrap();
        logger.info("first");
        logger.error("second");
        logger.close();

        assert_eq!(logger.read(None).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_closed_log_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_log(&dir);

        let logger = TaskLogger::new("file").with_path(Some(path));
        logger.clear().unwrap();
        logger.info("kept");
        logger.close();
        logger.info("dropped");

        assert_eq!(logger.read(None).unwrap(), "kept\n");
    }

    #[test]
    fn test_read_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_log(&dir);
        fs::write(&path, "a\nb\nc\n").unwrap();

        let logger = TaskLogger::new("file").with_path(Some(path));
        let content = logger.read(Some(2)).unwrap();

        assert!(content.starts_with("a\nb\n\n\n"));
        assert!(content.ends_with("See **tasks.log** for more details."));
    }

    #[test]
    fn test_read_short_file_is_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_log(&dir);
        fs::write(&path, "a\n").unwrap();

        let logger = TaskLogger::new("file").with_path(Some(path));
        assert_eq!(logger.read(Some(5)).unwrap(), "a\n");
    }
}
