//! Per-run conversion log.
//!
//! A [`RunLog`] is created by the caller and handed to the pipeline; there is
//! no global logger. It is cleared when a run begins, appended to while the
//! run progresses, and read back at the end for display.
//!
//! Lines use the format:
//!
//! ```text
//! 2026-10-18 14:03:11,482 - INFO - Converted trips/rome.png -> trips/rome.avif (quality=41, ...)
//! ```
//!
//! Every event is also mirrored to `tracing` at the matching level.

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARNING",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.level,
            self.message
        )
    }
}

/// Append-only log for one run, optionally backed by a file.
#[derive(Debug, Default)]
pub struct RunLog {
    events: Vec<LogEvent>,
    path: Option<PathBuf>,
    file: Option<File>,
}

impl RunLog {
    /// Keep events in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Also write events to `path`. The file is truncated by [`RunLog::begin`].
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a new run: drop previous events and truncate the backing file.
    pub fn begin(&mut self) -> io::Result<()> {
        self.events.clear();
        self.file = None;
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            self.file = Some(file);
        }
        Ok(())
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.append(LogLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.append(LogLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.append(LogLevel::Error, message.into());
    }

    fn append(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        let event = LogEvent {
            timestamp: Local::now(),
            level,
            message,
        };
        if let Some(file) = &mut self.file {
            if let Err(e) = writeln!(file, "{event}").and_then(|()| file.flush()) {
                tracing::warn!(error = %e, "failed to write run log");
            }
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Events at `level`, for assertions and summaries.
    pub fn count(&self, level: LogLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    /// Full text of the log: the file contents when file-backed, otherwise the
    /// rendered in-memory events.
    pub fn read_back(&self) -> io::Result<String> {
        match &self.path {
            Some(path) if path.exists() => std::fs::read_to_string(path),
            _ => Ok(self
                .events
                .iter()
                .map(|e| format!("{e}\n"))
                .collect()),
        }
    }
}
